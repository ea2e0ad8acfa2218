//! A Twitch chat bot core.
//!
//! A [`Bot`] keeps one connection to a chat server, parses every line it
//! receives into an [`ExtendedMessage`], and runs it past an ordered set of
//! [`Trigger`]s. Everything the bot sends goes through a single paced queue,
//! so that the server's flood limits are never hit however many triggers are
//! talking at once.
//!
//! # Session hand-off
//!
//! With `hijack_session` enabled, a bot that starts while another process is
//! running with the same configuration takes over that process's socket
//! rather than dialing a new one. The predecessor stops reading and writing,
//! sends its session state and the socket descriptor over a Unix socket (see
//! the [`handoff`] module), and exits its [`Bot::run`] with
//! [`RunOutcome::HandedOff`]. The server sees no disconnect and the successor
//! carries on without registering again.

mod bot;
pub use bot::*;

mod config;
pub use config::*;

mod errors;
pub use errors::*;

mod message;
pub use message::*;

mod tags;
pub use tags::*;

pub mod trigger;
pub use trigger::{DispatchMode, Trigger, TriggerSet};

pub mod handoff;
pub use handoff::SavedSession;

mod session;
pub use session::{RunOutcome, SessionState};

pub mod utils;

pub use cybot_connection::ConnectionError;
