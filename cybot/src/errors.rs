use cybot_connection::ConnectionError;
use thiserror::Error;

/// A failure while passing a session to or from another process
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Session hand-off is not supported here")]
    Unsupported,
    #[error("Rendezvous error: {0}")]
    Ipc(#[from] cybot_ipc::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Errors returned from [`Bot::run`](crate::Bot::run)
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Couldn't connect to {host}: {source}")]
    Dial {
        host: String,
        source: ConnectionError,
    },
    #[error("Hand-off failed: {0}")]
    Handoff(#[from] HandoffError),
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Bot is already running")]
    AlreadyRunning,
}
