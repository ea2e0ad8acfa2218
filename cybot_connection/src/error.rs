use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// An error that ends a single connection.
#[derive(Error,Debug)]
pub enum ConnectionError
{
    #[error("Connection closed")]
    Closed,
    #[error("I/O Error: {0}")]
    IoError(String),
    #[error("No data received for {0:?}")]
    IdleTimeout(std::time::Duration),
    #[error("Input line too long")]
    InputLineTooLong,
    #[error("Send queue closed")]
    SendQueueClosed,
    #[error("Writing to the connection failed")]
    WriteFailed,
    #[error("Internal error")]
    InternalError,
}

impl From<std::io::Error> for ConnectionError
{
    fn from(e: std::io::Error) -> Self
    {
        Self::IoError(e.to_string())
    }
}

impl<T> From<SendError<T>> for ConnectionError
{
    fn from(_: SendError<T>) -> Self
    {
        Self::SendQueueClosed
    }
}

impl From<tokio::task::JoinError> for ConnectionError
{
    fn from(e: tokio::task::JoinError) -> Self
    {
        tracing::error!("Connection task failed: {}", e);
        Self::InternalError
    }
}
