use crate::*;
use internal::*;

use std::{
    net::SocketAddr,
    os::unix::io::OwnedFd,
    time::Duration,
};

use tokio::{
    net::{
        tcp::{
            OwnedReadHalf,
            OwnedWriteHalf,
        },
        TcpStream,
    },
    sync::{
        mpsc::{
            channel,
            Receiver,
        },
        oneshot,
    },
    task::JoinHandle,
};

const EVENT_QUEUE_LEN: usize = 64;

/// Timing parameters for a [`Connection`]
#[derive(Debug,Clone,Copy)]
pub struct ConnectionSettings
{
    /// Minimum gap between two outbound lines
    pub throttle: Duration,
    /// How long the connection may go without receiving a line
    pub idle_timeout: Duration,
}

/// Something that happened on a connection.
#[derive(Debug)]
pub enum ConnectionEvent
{
    /// A line was received, without its terminator
    Message(String),
    /// The connection failed. No further events follow an error from the reader.
    Error(ConnectionError),
}

/// A connection whose reading and writing have been stopped, ready to be
/// handed to another process.
pub struct SavedConnection
{
    pub stream: std::net::TcpStream,
    /// Bytes read from the socket that did not yet form a complete line
    pub pending_input: Vec<u8>,
    /// The outbound queue, holding any lines that were not yet written
    pub outbound: Receiver<String>,
}

/// A reader or pacer task. Dropping the handle without stopping it aborts the task.
struct TaskHandle<T>
{
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<T>,
}

impl<T> TaskHandle<T>
{
    fn new(stop: oneshot::Sender<()>, task: JoinHandle<T>) -> Self
    {
        Self { stop: Some(stop), task }
    }

    async fn stop(mut self) -> Result<T, ConnectionError>
    {
        if let Some(stop) = self.stop.take()
        {
            // The task may already have finished, in which case nobody is listening
            let _ = stop.send(());
        }
        Ok((&mut self.task).await?)
    }
}

impl<T> Drop for TaskHandle<T>
{
    fn drop(&mut self)
    {
        self.task.abort();
    }
}

/// Open a TCP connection to `host` (`host:port`)
#[tracing::instrument]
pub async fn connect(host: &str) -> Result<TcpStream, ConnectionError>
{
    let stream = TcpStream::connect(host).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Turn a descriptor received from another process back into a stream.
///
/// Must be called from within a tokio runtime.
pub fn adopt(fd: OwnedFd) -> Result<TcpStream, ConnectionError>
{
    let stream = std::net::TcpStream::from(fd);
    stream.set_nonblocking(true)?;
    Ok(TcpStream::from_std(stream)?)
}

/// A live connection to the server.
///
/// Reading and writing each happen on their own task: the reader is the only
/// thing that touches the read half, and the pacer the only thing that touches
/// the write half. Lines read arrive through [`next_event`](Self::next_event);
/// lines to write are taken from the outbound queue supplied at start.
pub struct Connection
{
    pub remote_addr: Option<SocketAddr>,
    events: Receiver<ConnectionEvent>,
    reader: TaskHandle<ReaderExit<OwnedReadHalf>>,
    pacer: TaskHandle<PacerExit<OwnedWriteHalf>>,
}

impl Connection
{
    /// Start reading from and writing to `stream`.
    ///
    /// `pending_input` is treated as if it had been read from the socket before
    /// anything else.
    pub fn start(stream: TcpStream,
        pending_input: Vec<u8>,
        outbound: Receiver<String>,
        settings: ConnectionSettings) -> Self
    {
        let remote_addr = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let (event_send, event_recv) = channel(EVENT_QUEUE_LEN);

        let (reader_stop, reader_stop_recv) = oneshot::channel();
        let reader_task = ReaderTask::new(read_half, pending_input, settings.idle_timeout, event_send.clone(), reader_stop_recv);

        let (pacer_stop, pacer_stop_recv) = oneshot::channel();
        let pacer_task = PacerTask::new(write_half, outbound, settings.throttle, event_send, pacer_stop_recv);

        tracing::debug!(?remote_addr, "Starting connection tasks");

        Self {
            remote_addr,
            events: event_recv,
            reader: TaskHandle::new(reader_stop, tokio::spawn(reader_task.run())),
            pacer: TaskHandle::new(pacer_stop, tokio::spawn(pacer_task.run())),
        }
    }

    /// Wait for the next line or failure.
    ///
    /// Returns `None` once both tasks have gone away.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent>
    {
        self.events.recv().await
    }

    /// Stop both tasks and close the socket.
    ///
    /// Returns the outbound queue so that it can be used by a later connection,
    /// or `None` if a write failed and the queue was closed.
    pub async fn close(self) -> Result<Option<Receiver<String>>, ConnectionError>
    {
        let _ = self.reader.stop().await?;
        let exit = self.pacer.stop().await?;

        tracing::debug!(remote_addr=?self.remote_addr, "Connection closed");
        // The write half, and with it the socket, is dropped here
        Ok((!exit.failed).then(|| exit.queue))
    }

    /// Stop both tasks without closing the socket, and return everything needed
    /// to resume the connection elsewhere.
    ///
    /// Lines already read but not yet taken with [`next_event`](Self::next_event)
    /// are returned as pending input, ahead of any unframed bytes.
    ///
    /// On failure the socket is closed; the outbound queue is lost with it.
    pub async fn save(mut self) -> Result<SavedConnection, ConnectionError>
    {
        let reader = self.reader.stop().await?;
        let pacer = self.pacer.stop().await?;

        if pacer.failed
        {
            return Err(ConnectionError::WriteFailed);
        }

        let mut pending_input = Vec::new();
        while let Ok(event) = self.events.try_recv()
        {
            if let ConnectionEvent::Message(line) = event
            {
                pending_input.extend_from_slice(line.as_bytes());
                pending_input.extend_from_slice(b"\r\n");
            }
        }
        pending_input.extend_from_slice(&reader.pending);

        let stream = reader.reader.reunite(pacer.writer).map_err(|_| ConnectionError::InternalError)?;

        Ok(SavedConnection {
            stream: stream.into_std()?,
            pending_input,
            outbound: pacer.queue,
        })
    }
}
