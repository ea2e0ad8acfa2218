//! The [`Bot`] type and the operations available to applications and
//! trigger actions.

use crate::{
    handoff::{ColdReconnect, SessionHandoff, UnixHandoff},
    session::{SessionControl, SessionState},
    utils::{format_duration, split_payload, Latch},
    BotConfig, ExtendedMessage, Message, Trigger, TriggerSet,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};

mod triggers;

/// Longest PRIVMSG or NOTICE body sent in one frame, in bytes
pub const MAX_PAYLOAD_LEN: usize = 400;

/// A chat bot: one session with one server, the triggers that respond to
/// it, and the queue that paces everything it sends.
///
/// Created with [`Bot::new`] and driven by [`Bot::run`]. All other operations
/// may be called from any task, whether or not the bot is running.
pub struct Bot {
    pub(crate) config: BotConfig,
    pub(crate) nick: RwLock<String>,
    pub(crate) started: RwLock<DateTime<Utc>>,
    pub(crate) state: RwLock<SessionState>,
    pub(crate) triggers: RwLock<TriggerSet>,
    pub(crate) channels_joined: Latch,

    pub(crate) outgoing: RwLock<mpsc::Sender<String>>,
    // Held here whenever no connection is draining it
    pub(crate) outgoing_queue: Mutex<Option<mpsc::Receiver<String>>>,
    pub(crate) incoming: Mutex<Option<broadcast::Sender<Arc<ExtendedMessage>>>>,
    pub(crate) control: Mutex<Option<mpsc::UnboundedSender<SessionControl>>>,

    pub(crate) handoff: Arc<dyn SessionHandoff>,
    pub(crate) running: AtomicBool,
}

impl Bot {
    /// Create a bot with the default triggers registered.
    ///
    /// If `hijack_session` is set the bot hands sessions over a Unix socket at
    /// the configured rendezvous path; otherwise it always dials afresh.
    pub fn new(config: BotConfig) -> Arc<Self> {
        let handoff: Arc<dyn SessionHandoff> = if config.hijack_session {
            Arc::new(UnixHandoff::new(config.rendezvous_path()))
        } else {
            Arc::new(ColdReconnect)
        };
        Self::with_handoff(config, handoff)
    }

    /// Create a bot with a specific hand-off implementation
    pub fn with_handoff(config: BotConfig, handoff: Arc<dyn SessionHandoff>) -> Arc<Self> {
        let (outgoing, outgoing_queue) = mpsc::channel(config.send_queue_len());

        let mut defaults = TriggerSet::new();
        defaults.register(triggers::keepalive());
        defaults.register(triggers::join_channels());

        Arc::new(Self {
            nick: RwLock::new(config.nick.clone()),
            started: RwLock::new(Utc::now()),
            state: RwLock::new(SessionState::Disconnected),
            triggers: RwLock::new(defaults),
            channels_joined: Latch::new(),
            outgoing: RwLock::new(outgoing),
            outgoing_queue: Mutex::new(Some(outgoing_queue)),
            incoming: Mutex::new(None),
            control: Mutex::new(None),
            handoff,
            running: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// The nick currently in use
    pub fn nick(&self) -> String {
        self.nick.read().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Queue one raw protocol line, without terminator.
    ///
    /// Waits while the outbound queue is full. Lines queued while no session
    /// is running are dropped when the next session starts, and lines that
    /// can't be written because the connection failed are dropped with a
    /// warning.
    pub async fn send(&self, line: impl Into<String>) {
        let sender = self.outgoing.read().clone();
        if let Err(e) = sender.send(line.into()).await {
            tracing::warn!(line = ?e.0, "Outbound queue closed; dropping line");
        }
    }

    async fn send_split(&self, command: &str, target: &str, text: &str) {
        for piece in split_payload(text, MAX_PAYLOAD_LEN) {
            self.send(format!("{} {} :{}", command, target, piece)).await;
        }
    }

    /// Send a message, split into several if it is long
    pub async fn msg(&self, target: &str, text: &str) {
        self.send_split("PRIVMSG", target, text).await;
    }

    pub async fn notice(&self, target: &str, text: &str) {
        self.send_split("NOTICE", target, text).await;
    }

    /// Send a `/me` style action
    pub async fn action(&self, target: &str, text: &str) {
        self.msg(target, &format!("\x01ACTION {}\x01", text)).await;
    }

    pub async fn topic(&self, channel: &str, text: &str) {
        self.send(format!("TOPIC {} :{}", channel, text)).await;
    }

    pub async fn set_nick(&self, nick: &str) {
        *self.nick.write() = nick.to_string();
        self.send(format!("NICK {}", nick)).await;
    }

    /// Join a channel, given as `name` or `name:key`
    pub async fn join(&self, channel: &str) {
        match channel.split_once(':') {
            Some((name, key)) => self.send(format!("JOIN {} {}", name, key)).await,
            None => self.send(format!("JOIN {}", channel)).await,
        }
    }

    pub async fn part(&self, channel: &str) {
        self.send(format!("PART {}", channel)).await;
    }

    /// Set `mode` (e.g. `+o`) on `user` in `channel`
    pub async fn ch_mode(&self, user: &str, channel: &str, mode: &str) {
        self.send(format!("MODE {} {} {}", channel, mode, user)).await;
    }

    /// Answer a message where it came from: in the channel if it was sent to
    /// one, otherwise privately to the sender.
    pub async fn reply(&self, message: &Message, text: &str) {
        let target = if message.to().starts_with('#') {
            message.to()
        } else {
            message.from()
        };
        self.msg(target, text).await;
    }

    /// Join every configured channel, unless that has already been done
    /// this session
    pub(crate) async fn join_configured_channels(&self) {
        if !self.channels_joined.fire() {
            tracing::trace!("Channels already joined");
            return;
        }

        for channel in &self.config.channels {
            self.join(channel).await;
        }
        tracing::info!(channels = ?self.config.channels, "Joined channels");
        self.advance_state(SessionState::Registering, SessionState::Joined);
    }

    /// How long the bot has been up, including time spent in predecessors
    /// it took over from
    pub fn uptime(&self) -> Duration {
        (Utc::now() - *self.started.read())
            .to_std()
            .unwrap_or_default()
    }

    pub fn uptime_string(&self) -> String {
        format_duration(self.uptime())
    }

    /// Register a trigger, after all those already registered
    pub fn add_trigger(&self, trigger: Trigger) {
        tracing::debug!(trigger = trigger.name(), "Adding trigger");
        self.triggers.write().register(trigger);
    }

    /// Receive every message from the current (or next) session.
    ///
    /// The receiver reports `Closed` when that session ends. A receiver that
    /// falls too far behind skips the messages it missed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ExtendedMessage>> {
        self.incoming
            .lock()
            .get_or_insert_with(|| broadcast::channel(self.config.incoming_queue_len()).0)
            .subscribe()
    }

    /// Ask a running session to disconnect cleanly
    pub fn stop(&self) {
        self.send_control(SessionControl::Stop);
    }

    /// Stop listening for a successor. Does nothing if no rendezvous point
    /// is open.
    pub fn close(&self) {
        self.send_control(SessionControl::CloseRendezvous);
    }

    fn send_control(&self, control: SessionControl) {
        if let Some(channel) = &*self.control.lock() {
            // The session may be on its way out, in which case there's nothing to do
            let _ = channel.send(control);
        }
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("nick", &*self.nick.read())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}
