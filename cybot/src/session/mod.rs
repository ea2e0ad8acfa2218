//! Driving a [`Bot`] through one session: finding or dialing a connection,
//! registering, dispatching everything received, and finally closing the
//! connection or passing it on.

use crate::{
    handoff::{HandoffSink, InheritedSession, SavedSession, SessionHandoff},
    Bot, BotError, ExtendedMessage,
};
use cybot_connection::{
    adopt, connect, Connection, ConnectionError, ConnectionEvent, ConnectionSettings,
};

use std::{
    os::unix::io::OwnedFd,
    sync::{atomic::Ordering, Arc},
};
use tokio::{
    net::TcpStream,
    select,
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

mod state;
pub use state::*;

/// Requests delivered to the session loop from outside it
pub(crate) enum SessionControl {
    Stop,
    CloseRendezvous,
    Handoff(Box<dyn HandoffSink>),
}

enum Ending {
    Closed(Option<ConnectionError>),
    Stopped,
    Handoff(Box<dyn HandoffSink>),
}

/// A socket ready to be driven, fresh or inherited
struct OpenedStream {
    stream: TcpStream,
    pending_input: Vec<u8>,
    unsent: Vec<String>,
    inherited: bool,
}

/// Puts the bot back into its idle state however `run` finishes
struct RunGuard<'a>(&'a Arc<Bot>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.end_session();
    }
}

/// The task waiting for a successor, if one was started
struct Rendezvous(Option<JoinHandle<()>>);

impl Rendezvous {
    fn open(handoff: &dyn SessionHandoff, control: mpsc::UnboundedSender<SessionControl>) -> Self {
        let mut listener = match handoff.listen() {
            Ok(Some(listener)) => listener,
            Ok(None) => return Self(None),
            Err(e) => {
                tracing::warn!("Couldn't open rendezvous point: {}", e);
                return Self(None);
            }
        };

        Self(Some(tokio::spawn(async move {
            match listener.accept().await {
                Ok(sink) => {
                    let _ = control.send(SessionControl::Handoff(sink));
                }
                Err(e) => tracing::warn!("Error waiting for a successor: {}", e),
            }
        })))
    }

    /// Stop listening; the listener and its socket file go with the task
    fn close(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
            tracing::debug!("Closed rendezvous point");
        }
    }
}

impl Drop for Rendezvous {
    fn drop(&mut self) {
        self.close();
    }
}

/// Empty a queue that nobody is going to write out
fn discard_queued(queue: &mut mpsc::Receiver<String>, reason: &str) {
    let mut discarded = 0;
    while queue.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        tracing::debug!(discarded, reason, "Discarded outbound lines");
    }
}

impl Bot {
    /// Run one session to completion.
    ///
    /// Takes over a predecessor's connection if hand-off is enabled and one is
    /// running, otherwise dials the configured host and registers. Returns
    /// once the connection ends, [`stop`](Self::stop) is called, or the
    /// session has been handed to a successor. The bot can then be run again.
    ///
    /// Failing to dial is returned as an error and is not retried.
    #[tracing::instrument(skip(self), fields(host = %self.config.host))]
    pub async fn run(self: &Arc<Self>) -> Result<RunOutcome, BotError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(BotError::AlreadyRunning);
        }
        let _guard = RunGuard(self);

        let mut outbound = self.take_outbound_queue();
        self.set_state(SessionState::Connecting);

        let opened = match self.open_stream().await {
            Ok(opened) => opened,
            Err(e) => {
                *self.outgoing_queue.lock() = Some(outbound);
                return Err(e);
            }
        };

        // Lines sent while no session was running must not go out ahead of
        // registration
        discard_queued(&mut outbound, "sent between sessions");

        let settings = ConnectionSettings {
            throttle: self.config.throttle_delay(),
            idle_timeout: self.config.ping_timeout(),
        };
        let mut conn = Connection::start(opened.stream, opened.pending_input, outbound, settings);

        let incoming = self
            .incoming
            .lock()
            .get_or_insert_with(|| broadcast::channel(self.config.incoming_queue_len()).0)
            .clone();
        let (control_send, mut control_recv) = mpsc::unbounded_channel();
        *self.control.lock() = Some(control_send.clone());
        let mut rendezvous = Rendezvous::open(&*self.handoff, control_send);

        if opened.inherited {
            // A predecessor that hadn't finished registering leaves us to finish it
            if self.channels_joined.is_set() {
                self.set_state(SessionState::Running);
            } else {
                self.set_state(SessionState::Registering);
            }
            for line in opened.unsent {
                self.send(line).await;
            }
        } else {
            self.register().await;
        }

        let ending = self
            .session_loop(&mut conn, &incoming, &mut control_recv, &mut rendezvous)
            .await;
        rendezvous.close();

        let outcome = match ending {
            Ending::Closed(error) => {
                self.close_connection(conn).await;
                RunOutcome::Disconnected(error)
            }
            Ending::Stopped => {
                self.close_connection(conn).await;
                RunOutcome::Stopped
            }
            Ending::Handoff(sink) => self.hand_off(conn, sink).await,
        };

        tracing::info!(?outcome, "Session ended");
        Ok(outcome)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        if *current != state {
            tracing::debug!(from = ?*current, to = ?state, "Session state changed");
            *current = state;
        }
    }

    /// Move to `to` only if currently in `from`
    pub(crate) fn advance_state(&self, from: SessionState, to: SessionState) {
        let mut current = self.state.write();
        if *current == from {
            tracing::debug!(?from, ?to, "Session state changed");
            *current = to;
        }
    }

    fn end_session(&self) {
        self.control.lock().take();
        // Dropping the last sender closes every subscriber's stream
        self.incoming.lock().take();
        self.channels_joined.reset();
        self.set_state(SessionState::Disconnected);
        self.running.store(false, Ordering::Release);
    }

    fn take_outbound_queue(&self) -> mpsc::Receiver<String> {
        if let Some(queue) = self.outgoing_queue.lock().take() {
            return queue;
        }

        // Lost along with a connection that couldn't be shut down cleanly
        tracing::warn!("Replacing lost outbound queue");
        self.new_outbound_queue()
    }

    /// Point `send` at a fresh queue, returning its receiving end
    fn new_outbound_queue(&self) -> mpsc::Receiver<String> {
        let (sender, queue) = mpsc::channel(self.config.send_queue_len());
        *self.outgoing.write() = sender;
        queue
    }

    fn park_new_outbound_queue(&self) {
        let queue = self.new_outbound_queue();
        *self.outgoing_queue.lock() = Some(queue);
    }

    async fn open_stream(&self) -> Result<OpenedStream, BotError> {
        if let Some(inherited) = self.inherit().await {
            match self.resume(inherited) {
                Ok(opened) => return Ok(opened),
                Err(e) => tracing::warn!("Couldn't adopt inherited connection: {}", e),
            }
        }

        let stream = connect(&self.config.host)
            .await
            .map_err(|source| BotError::Dial {
                host: self.config.host.clone(),
                source,
            })?;
        tracing::info!("Connected");

        Ok(OpenedStream {
            stream,
            pending_input: Vec::new(),
            unsent: Vec::new(),
            inherited: false,
        })
    }

    async fn inherit(&self) -> Option<InheritedSession> {
        match tokio::time::timeout(self.config.handoff_timeout(), self.handoff.inherit()).await {
            Ok(Ok(inherited)) => inherited,
            Ok(Err(e)) => {
                tracing::warn!("Couldn't take over from predecessor: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Timed out waiting for predecessor");
                None
            }
        }
    }

    fn resume(&self, inherited: InheritedSession) -> Result<OpenedStream, ConnectionError> {
        let stream = adopt(OwnedFd::from(inherited.stream))?;
        let session = inherited.session;

        *self.nick.write() = session.nick;
        *self.started.write() = session.started;
        if session.channels_joined {
            self.channels_joined.set();
        }

        Ok(OpenedStream {
            stream,
            pending_input: session.pending_input,
            unsent: session.unsent,
            inherited: true,
        })
    }

    async fn register(&self) {
        self.set_state(SessionState::Registering);
        let nick = self.nick();

        if let Some(password) = &self.config.password {
            self.send(format!("PASS {}", password)).await;
        }
        self.send(format!("USER {} 8 * :{}", nick, nick)).await;
        self.send(format!("NICK {}", nick)).await;
        if !self.config.capabilities.is_empty() {
            self.send(format!("CAP REQ :{}", self.config.capabilities.join(" ")))
                .await;
        }

        tracing::info!(%nick, "Registering");
    }

    async fn session_loop(
        self: &Arc<Self>,
        conn: &mut Connection,
        incoming: &broadcast::Sender<Arc<ExtendedMessage>>,
        control: &mut mpsc::UnboundedReceiver<SessionControl>,
        rendezvous: &mut Rendezvous,
    ) -> Ending {
        loop {
            select! {
                // A stop must not wait for a backlog to be dispatched; lines
                // left over at a hand-off travel with the saved session
                biased;

                request = control.recv() => match request {
                    Some(SessionControl::Stop) => {
                        tracing::info!("Stop requested");
                        return Ending::Stopped;
                    }
                    Some(SessionControl::CloseRendezvous) => rendezvous.close(),
                    Some(SessionControl::Handoff(sink)) => return Ending::Handoff(sink),
                    None => return Ending::Stopped,
                },
                event = conn.next_event() => match event {
                    Some(ConnectionEvent::Message(line)) => self.handle_line(&line, incoming).await,
                    Some(ConnectionEvent::Error(e)) => {
                        tracing::info!("Connection lost: {}", e);
                        return Ending::Closed(Some(e));
                    }
                    None => return Ending::Closed(None),
                },
            }
        }
    }

    async fn handle_line(
        self: &Arc<Self>,
        line: &str,
        incoming: &broadcast::Sender<Arc<ExtendedMessage>>,
    ) {
        let message = match ExtendedMessage::parse(line) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                tracing::debug!(?line, "Dropping malformed line: {}", e);
                return;
            }
        };

        self.advance_state(SessionState::Joined, SessionState::Running);

        let triggers = self.triggers.read().clone();
        let matched = triggers.dispatch(self, &message).await;
        tracing::trace!(command = message.command(), matched, "Dispatched");

        // Having nobody subscribed is normal
        let _ = incoming.send(message);
    }

    async fn close_connection(&self, conn: Connection) {
        match conn.close().await {
            Ok(Some(mut queue)) => {
                discard_queued(&mut queue, "queued for the closed connection");
                *self.outgoing_queue.lock() = Some(queue);
            }
            Ok(None) => {
                tracing::debug!("Outbound queue was closed by a write failure");
                self.park_new_outbound_queue();
            }
            Err(e) => {
                tracing::error!("Error closing connection: {}", e);
                self.park_new_outbound_queue();
            }
        }
    }

    /// Stop using the connection and pass it, with everything in flight, to
    /// the successor
    async fn hand_off(&self, conn: Connection, sink: Box<dyn HandoffSink>) -> RunOutcome {
        let saved = match conn.save().await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("Couldn't stop connection for hand-off: {}", e);
                self.park_new_outbound_queue();
                return RunOutcome::Disconnected(Some(e));
            }
        };

        let mut outbound = saved.outbound;
        let unsent = std::iter::from_fn(|| outbound.try_recv().ok()).collect();
        *self.outgoing_queue.lock() = Some(outbound);

        let session = SavedSession {
            nick: self.nick(),
            channels_joined: self.channels_joined.is_set(),
            started: *self.started.read(),
            pending_input: saved.pending_input,
            unsent,
        };

        match sink.deliver(session, &saved.stream).await {
            Ok(()) => {
                tracing::info!("Handed session to successor");
                RunOutcome::HandedOff
            }
            Err(e) => {
                // Our copy of the socket is dropped with `saved`, closing it
                tracing::error!("Hand-off failed: {}", e);
                RunOutcome::Disconnected(None)
            }
        }
    }
}
