use super::*;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Upper bound on an encoded [`SavedSession`]
const MAX_SESSION_LEN: u64 = 1 << 20;

/// Hand-off over a filesystem Unix socket, passing the connection's
/// descriptor to the successor.
#[derive(Debug, Clone)]
pub struct UnixHandoff {
    path: PathBuf,
}

impl UnixHandoff {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionHandoff for UnixHandoff {
    #[tracing::instrument(skip(self), fields(path = ?self.path))]
    async fn inherit(&self) -> Result<Option<InheritedSession>, HandoffError> {
        let mut receiver =
            match cybot_ipc::connect::<SavedSession>(&self.path, MAX_SESSION_LEN).await {
                Ok(receiver) => receiver,
                Err(cybot_ipc::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) =>
                {
                    tracing::debug!("No predecessor to take over from");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

        let (session, fd) = receiver.recv().await?;
        tracing::info!(nick = %session.nick, "Took over session from predecessor");

        Ok(Some(InheritedSession {
            session,
            stream: std::net::TcpStream::from(fd),
        }))
    }

    fn listen(&self) -> Result<Option<Box<dyn HandoffListener>>, HandoffError> {
        let listener = cybot_ipc::Listener::bind(&self.path, MAX_SESSION_LEN)?;
        tracing::debug!(path = ?self.path, "Listening for a successor");

        Ok(Some(Box::new(UnixHandoffListener { listener })))
    }
}

struct UnixHandoffListener {
    listener: cybot_ipc::Listener<SavedSession>,
}

#[async_trait]
impl HandoffListener for UnixHandoffListener {
    async fn accept(&mut self) -> Result<Box<dyn HandoffSink>, HandoffError> {
        let sender = self.listener.accept().await?;
        tracing::info!("Successor is asking for the session");

        Ok(Box::new(UnixHandoffSink { sender }))
    }
}

struct UnixHandoffSink {
    sender: cybot_ipc::Sender<SavedSession>,
}

#[async_trait]
impl HandoffSink for UnixHandoffSink {
    async fn deliver(
        mut self: Box<Self>,
        session: SavedSession,
        stream: &std::net::TcpStream,
    ) -> Result<(), HandoffError> {
        self.sender.send(&session, stream).await?;
        Ok(())
    }
}
