//! Passing a live session from one bot process to the next.
//!
//! A running bot opens a rendezvous point through its [`SessionHandoff`]. A
//! newly started bot configured for the same account asks the same
//! implementation for an [`InheritedSession`] before dialing; if it gets one,
//! it carries on using the predecessor's socket and the server never sees a
//! disconnect.

use crate::HandoffError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod cold;
pub use cold::*;

mod unix;
pub use unix::*;

/// Everything a successor needs, besides the socket itself, to resume a
/// session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub nick: String,
    /// Whether the configured channels have already been joined
    pub channels_joined: bool,
    /// When the first bot in the chain started, so that uptime carries over
    pub started: DateTime<Utc>,
    /// Bytes read from the socket that did not yet form a complete line
    pub pending_input: Vec<u8>,
    /// Outbound lines that were queued but not yet written
    pub unsent: Vec<String>,
}

/// A session received from a predecessor
#[derive(Debug)]
pub struct InheritedSession {
    pub session: SavedSession,
    pub stream: std::net::TcpStream,
}

/// A way of finding a predecessor to take over from, and of offering our own
/// session to a successor.
#[async_trait]
pub trait SessionHandoff: Send + Sync {
    /// Look for a running predecessor and take its session.
    ///
    /// `Ok(None)` means there was nobody to take over from.
    async fn inherit(&self) -> Result<Option<InheritedSession>, HandoffError>;

    /// Open a rendezvous point for a successor to find us.
    ///
    /// `Ok(None)` means this implementation never hands sessions on.
    fn listen(&self) -> Result<Option<Box<dyn HandoffListener>>, HandoffError>;
}

/// An open rendezvous point
#[async_trait]
pub trait HandoffListener: Send {
    /// Wait for a successor to ask for the session
    async fn accept(&mut self) -> Result<Box<dyn HandoffSink>, HandoffError>;
}

/// A successor waiting to receive the session
#[async_trait]
pub trait HandoffSink: Send {
    /// Send the session and a copy of the socket. The caller's copy can be
    /// dropped afterwards without disturbing the connection.
    async fn deliver(
        self: Box<Self>,
        session: SavedSession,
        stream: &std::net::TcpStream,
    ) -> Result<(), HandoffError>;
}
