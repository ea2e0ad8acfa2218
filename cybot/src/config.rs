use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// The smallest outbound queue a bot will run with
pub const MIN_SEND_QUEUE_LEN: usize = 16;

fn default_channels() -> Vec<String> {
    vec!["#test".to_string()]
}

fn default_throttle_delay_ms() -> u64 {
    200
}

fn default_ping_timeout_ms() -> u64 {
    300_000
}

fn default_send_queue_len() -> usize {
    MIN_SEND_QUEUE_LEN
}

fn default_incoming_queue_len() -> usize {
    64
}

fn default_handoff_timeout_ms() -> u64 {
    2000
}

fn default_capabilities() -> Vec<String> {
    vec![
        "twitch.tv/tags".to_string(),
        "twitch.tv/commands".to_string(),
    ]
}

/// Settings for a single bot connection.
///
/// Everything except `host` and `nick` has a default.
#[derive(Clone, Deserialize)]
pub struct BotConfig {
    /// Server address, as `host:port`
    pub host: String,
    pub nick: String,
    /// Sent as `PASS` during registration; for Twitch this is `oauth:<token>`
    #[serde(default)]
    pub password: Option<String>,
    /// Channels to join once registered. A `name:key` entry joins with a key.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_throttle_delay_ms")]
    pub throttle_delay_ms: u64,
    /// How long the server may stay silent before the connection is dropped
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_send_queue_len")]
    pub send_queue_len: usize,
    #[serde(default = "default_incoming_queue_len")]
    pub incoming_queue_len: usize,
    /// Try to take over a running predecessor's connection before dialing,
    /// and offer our own to a successor.
    #[serde(default)]
    pub hijack_session: bool,
    #[serde(default)]
    pub rendezvous_path: Option<PathBuf>,
    #[serde(default = "default_handoff_timeout_ms")]
    pub handoff_timeout_ms: u64,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
}

impl BotConfig {
    pub fn new(host: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            nick: nick.into(),
            password: None,
            channels: default_channels(),
            throttle_delay_ms: default_throttle_delay_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            send_queue_len: default_send_queue_len(),
            incoming_queue_len: default_incoming_queue_len(),
            hijack_session: false,
            rendezvous_path: None,
            handoff_timeout_ms: default_handoff_timeout_ms(),
            capabilities: default_capabilities(),
        }
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn send_queue_len(&self) -> usize {
        self.send_queue_len.max(MIN_SEND_QUEUE_LEN)
    }

    pub fn incoming_queue_len(&self) -> usize {
        self.incoming_queue_len.max(1)
    }

    /// Where the hand-off socket lives. Unless configured, this is derived
    /// from the host and nick so that two bots for the same account meet at
    /// the same place.
    pub fn rendezvous_path(&self) -> PathBuf {
        match &self.rendezvous_path {
            Some(path) => path.clone(),
            None => {
                let host: String = self
                    .host
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
                    .collect();
                std::env::temp_dir().join(format!("cybot-{}-{}.sock", host, self.nick))
            }
        }
    }
}

// Hand-written so the password never ends up in a log line
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("host", &self.host)
            .field("nick", &self.nick)
            .field("password", &self.password.as_ref().map(|_| "<hidden>"))
            .field("channels", &self.channels)
            .field("throttle_delay_ms", &self.throttle_delay_ms)
            .field("ping_timeout_ms", &self.ping_timeout_ms)
            .field("send_queue_len", &self.send_queue_len)
            .field("incoming_queue_len", &self.incoming_queue_len)
            .field("hijack_session", &self.hijack_session)
            .field("rendezvous_path", &self.rendezvous_path)
            .field("handoff_timeout_ms", &self.handoff_timeout_ms)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
