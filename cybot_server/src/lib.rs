//! Process-level plumbing for running a [`cybot::Bot`]: the configuration
//! file, log output, signal handling, and the chat commands the `cybot`
//! binary ships with.

pub mod config;
pub use config::ServerConfig;

mod tracing_config;
pub use tracing_config::build_subscriber;

pub mod commands;

pub mod run;
