/// Where a bot is in the life of its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Looking for a predecessor or dialing the server
    Connecting,
    /// Registration sent, waiting for the server to welcome us
    Registering,
    /// Welcomed, and the configured channels have been joined
    Joined,
    Running,
}

/// How a call to [`Bot::run`](crate::Bot::run) ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The connection failed or was closed by the server
    Disconnected(Option<cybot_connection::ConnectionError>),
    /// [`Bot::stop`](crate::Bot::stop) was called
    Stopped,
    /// The connection now belongs to a successor
    HandedOff,
}

impl RunOutcome {
    pub fn is_handed_off(&self) -> bool {
        matches!(self, Self::HandedOff)
    }
}
