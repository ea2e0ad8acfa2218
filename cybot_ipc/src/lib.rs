//! A one-shot rendezvous channel over a filesystem-addressed Unix stream socket.
//!
//! Each message carries a bincode-serialised payload together with exactly one
//! file descriptor, passed as `SCM_RIGHTS` ancillary data. The listening side
//! ([`Listener`]) hands out a [`Sender`] for each accepted peer; the connecting
//! side gets a [`Receiver`] from [`connect`].

use serde::{
    Serialize,
    de::DeserializeOwned,
};
use tokio::{
    io::{
        AsyncReadExt,
        AsyncWriteExt,
        Interest,
    },
    net::{
        UnixListener,
        UnixStream,
    },
};
use std::{
    io::{
        IoSlice,
        IoSliceMut,
    },
    marker::PhantomData,
    os::unix::io::{
        AsRawFd,
        FromRawFd,
        OwnedFd,
        RawFd,
    },
    path::{
        Path,
        PathBuf,
    },
};
use nix::sys::socket::{
    recvmsg,
    sendmsg,
    ControlMessage,
    ControlMessageOwned,
    MsgFlags,
    UnixAddr,
};
use thiserror::Error;

use bincode::{
    Options,
    DefaultOptions,
};

/// Length of the frame header preceding each payload
const HEADER_LEN: usize = 4;

#[derive(Debug,Error)]
pub enum Error
{
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialisation error: {0}")]
    Serialize(#[from] bincode::Error),
    #[error("Socket error: {0}")]
    Nix(#[from] nix::Error),
    #[error("Message arrived without a file descriptor")]
    NoDescriptor,
    #[error("Message of {0} bytes exceeds the channel limit")]
    TooLarge(u64),
}

impl From<Error> for std::io::Error
{
    fn from(e: Error) -> Self
    {
        match e {
            Error::Io(e) => e,
            Error::Nix(e) => e.into(),
            other => std::io::Error::new(std::io::ErrorKind::Other, other)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The listening end of a rendezvous point.
///
/// The socket file is removed when the first peer is accepted, or when the
/// listener is dropped, whichever comes first. A rendezvous point therefore
/// serves at most one peer.
pub struct Listener<T: Serialize>
{
    listener: UnixListener,
    path: PathBuf,
    // Cleared once the socket file has been removed
    owns_path: bool,
    max_len: u64,
    _phantom: PhantomData<T>
}

impl<T: Serialize> Listener<T>
{
    /// Bind a rendezvous point at `path`.
    ///
    /// A leftover socket file with nobody listening on it is replaced. If another
    /// process is still accepting on `path`, this fails with `AddrInUse`.
    pub fn bind(path: impl AsRef<Path>, max_len: u64) -> Result<Self>
    {
        let path = path.as_ref().to_path_buf();

        if path.exists()
        {
            if std::os::unix::net::UnixStream::connect(&path).is_ok()
            {
                return Err(std::io::Error::from(std::io::ErrorKind::AddrInUse).into());
            }
            tracing::debug!(?path, "Removing stale rendezvous socket");
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;

        Ok(Self { listener, path, owns_path: true, max_len, _phantom: PhantomData })
    }

    /// The filesystem path this listener is bound to
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Wait for a peer to connect.
    ///
    /// The socket file is unlinked as soon as a peer arrives, so that the peer is
    /// free to bind its own rendezvous point at the same path.
    pub async fn accept(&mut self) -> Result<Sender<T>>
    {
        let (socket, _) = self.listener.accept().await?;
        self.remove_path();

        Ok(Sender::new(socket, self.max_len))
    }

    fn remove_path(&mut self)
    {
        if self.owns_path
        {
            self.owns_path = false;
            if let Err(e) = std::fs::remove_file(&self.path)
            {
                tracing::warn!(path=?self.path, "Couldn't remove rendezvous socket: {}", e);
            }
        }
    }
}

impl<T: Serialize> Drop for Listener<T>
{
    fn drop(&mut self)
    {
        self.remove_path();
    }
}

/// Connect to the rendezvous point at `path`.
///
/// Fails with `NotFound` or `ConnectionRefused` if nobody is listening there.
pub async fn connect<T: DeserializeOwned>(path: impl AsRef<Path>, max_len: u64) -> Result<Receiver<T>>
{
    let socket = UnixStream::connect(path).await?;
    Ok(Receiver::new(socket, max_len))
}

pub struct Sender<T: Serialize>
{
    socket: UnixStream,
    max_len: u64,
    _phantom: PhantomData<T>
}

impl <T: Serialize> Sender<T>
{
    fn new(socket: UnixStream, max_len: u64) -> Self
    {
        Self { socket, max_len, _phantom: PhantomData }
    }

    /// Send `data` along with a duplicate of `fd`.
    ///
    /// The caller keeps its own copy of the descriptor; closing it afterwards does
    /// not affect the copy received by the peer.
    pub async fn send(&mut self, data: &T, fd: &impl AsRawFd) -> Result<()>
    {
        let payload = DefaultOptions::new().with_limit(self.max_len).serialize(data)?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| Error::TooLarge(payload.len() as u64))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&payload_len.to_be_bytes());
        frame.extend_from_slice(&payload);

        let fds = [fd.as_raw_fd()];
        let raw_socket = self.socket.as_raw_fd();

        // The descriptor rides on the first segment; whatever the kernel didn't
        // take in that call is written normally.
        let sent = loop
        {
            self.socket.writable().await?;

            let result = self.socket.try_io(Interest::WRITABLE, || {
                let iov = [IoSlice::new(&frame)];
                let cmsgs = [ControlMessage::ScmRights(&fds)];
                Ok(sendmsg::<UnixAddr>(raw_socket, &iov, &cmsgs, MsgFlags::empty(), None)?)
            });

            match result
            {
                Ok(sent) => break sent,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into())
            }
        };

        if sent < frame.len()
        {
            self.socket.write_all(&frame[sent..]).await?;
        }

        Ok(())
    }
}

pub struct Receiver<T: DeserializeOwned>
{
    socket: UnixStream,
    max_len: u64,
    _phantom: PhantomData<T>
}

impl<T: DeserializeOwned> Receiver<T>
{
    fn new(socket: UnixStream, max_len: u64) -> Self
    {
        Self { socket, max_len, _phantom: PhantomData }
    }

    /// Receive one message and the file descriptor that accompanies it
    pub async fn recv(&mut self) -> Result<(T, OwnedFd)>
    {
        let mut header = [0u8; HEADER_LEN];
        let raw_socket = self.socket.as_raw_fd();

        let (received, fds) = loop
        {
            self.socket.readable().await?;

            let result = self.socket.try_io(Interest::READABLE, || {
                let mut iov = [IoSliceMut::new(&mut header)];
                let mut cmsg_buffer = nix::cmsg_space!([RawFd; 1]);
                let msg = recvmsg::<UnixAddr>(raw_socket, &mut iov, Some(&mut cmsg_buffer), MsgFlags::empty())?;

                let mut fds = Vec::new();
                for cmsg in msg.cmsgs()
                {
                    if let ControlMessageOwned::ScmRights(received) = cmsg
                    {
                        fds.extend(received);
                    }
                }
                Ok((msg.bytes, fds))
            });

            match result
            {
                Ok(r) => break r,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into())
            }
        };

        // Safety: these descriptors were installed in this process by the kernel
        // while receiving the message above, and nothing else refers to them.
        let mut fds = fds.into_iter().map(|fd| unsafe { OwnedFd::from_raw_fd(fd) });
        let fd = fds.next();
        // Any surplus descriptors are closed here
        drop(fds);

        if received == 0
        {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let fd = fd.ok_or(Error::NoDescriptor)?;

        if received < HEADER_LEN
        {
            self.socket.read_exact(&mut header[received..]).await?;
        }

        let len = u64::from(u32::from_be_bytes(header));
        if len > self.max_len
        {
            return Err(Error::TooLarge(len));
        }

        let mut payload = vec![0u8; len as usize];
        self.socket.read_exact(&mut payload).await?;

        let data = DefaultOptions::new().with_limit(self.max_len).deserialize(&payload)?;
        Ok((data, fd))
    }
}
