//! Reconnecting stream subscription
//!
//! One spawned task owns the socket and the connection state machine:
//!
//! ```text
//! Connecting --handshake ok--> Streaming --close/error/resync--> Backoff --delay--> Connecting
//! any phase --close()--> Closed
//! ```
//!
//! Frames are forwarded in receipt order over an unbounded channel so a slow
//! consumer never stalls pong replies. Other tasks observe the machine through
//! a `watch` of [`ConnectionState`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::WebSocketClient;
use crate::config::StreamSettings;
use crate::error::MarketDataError;
use crate::metrics;

/// Phase of the connection state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Streaming,
    Backoff { delay: Duration },
    Closed,
}

/// Observable state of one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub symbol: String,
    pub topic: String,
    pub phase: ConnectionPhase,
    /// Consecutive failed attempts since the last successful handshake
    pub reconnect_attempt: u32,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Streaming
    }
}

/// Shared slot the connection task publishes its state into
pub type ConnectionStateCell = Arc<watch::Sender<Option<ConnectionState>>>;

/// Inbound event sequence produced by a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A handshake succeeded; reconciliation state should restart.
    ///
    /// Sessions are numbered from 1 for the lifetime of the connection.
    SessionStarted { session: u64 },
    /// A data frame, as text
    Message(String),
    /// A connect attempt failed or an established session dropped
    ConnectionLost(String),
}

/// Cloneable handle used by a consumer to force a reconnect
#[derive(Debug, Clone)]
pub struct ResyncHandle {
    tx: mpsc::UnboundedSender<u64>,
}

impl ResyncHandle {
    /// Ask the connection to drop `session` and reconnect after the short resync delay.
    ///
    /// Ignored unless `session` is still the live one.
    pub fn request(&self, session: u64) {
        let _ = self.tx.send(session);
    }
}

/// Handle to a live subscription task
pub struct StreamConnection {
    topic: String,
    shutdown_tx: watch::Sender<bool>,
    resync: ResyncHandle,
    state: ConnectionStateCell,
    task: Option<JoinHandle<()>>,
}

impl StreamConnection {
    /// Spawn the connection task for `topic` and return the inbound event sequence
    pub fn open(
        settings: &StreamSettings,
        symbol: &str,
        topic: &str,
        state: ConnectionStateCell,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (resync_tx, resync_rx) = mpsc::unbounded_channel();

        state.send_replace(Some(ConnectionState {
            symbol: symbol.to_string(),
            topic: topic.to_string(),
            phase: ConnectionPhase::Connecting,
            reconnect_attempt: 0,
        }));

        let worker = StreamWorker {
            client: WebSocketClient::new(&settings.ws_endpoint, topic),
            settings: settings.clone(),
            topic: topic.to_string(),
            events: events_tx,
            shutdown: shutdown_rx,
            resync: resync_rx,
            state: state.clone(),
            attempt: 0,
            session: 0,
        };
        let task = tokio::spawn(worker.run());

        let connection = Self {
            topic: topic.to_string(),
            shutdown_tx,
            resync: ResyncHandle { tx: resync_tx },
            state,
            task: Some(task),
        };
        (connection, events_rx)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn resync_handle(&self) -> ResyncHandle {
        self.resync.clone()
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .borrow()
            .as_ref()
            .map(ConnectionState::is_connected)
            .unwrap_or(false)
    }

    /// Stop the connection task and wait for it to release the socket
    pub async fn close(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(topic = %self.topic, "Stream connection task panicked");
                }
            }
        }
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
    }
}

/// Why a session ended
enum SessionEnd {
    Shutdown,
    Resync,
    Lost(MarketDataError),
}

/// State owned by the connection task
struct StreamWorker {
    client: WebSocketClient,
    settings: StreamSettings,
    topic: String,
    events: mpsc::UnboundedSender<StreamEvent>,
    shutdown: watch::Receiver<bool>,
    resync: mpsc::UnboundedReceiver<u64>,
    state: ConnectionStateCell,
    attempt: u32,
    /// Number of the current (or last) session
    session: u64,
}

impl StreamWorker {
    /// Run until shutdown, reconnecting after every session end
    async fn run(mut self) {
        info!(topic = %self.topic, url = %self.client.url(), "Starting stream connection");

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.set_phase(ConnectionPhase::Connecting);

            let delay = match self.session().await {
                SessionEnd::Shutdown => break,
                SessionEnd::Resync => {
                    info!(topic = %self.topic, "Resynchronizing stream");
                    self.settings.resync_delay
                }
                SessionEnd::Lost(e) => {
                    self.attempt += 1;
                    error!(topic = %self.topic, attempt = self.attempt, error = %e, "Stream connection lost");
                    metrics::get()
                        .stream_failures
                        .with_label_values(&[self.topic.as_str()])
                        .inc();
                    let _ = self.events.send(StreamEvent::ConnectionLost(format!(
                        "{} (attempt {})",
                        e, self.attempt
                    )));
                    self.settings.reconnect_delay
                }
            };

            self.client.close().await;
            self.set_phase(ConnectionPhase::Backoff { delay });
            warn!(
                topic = %self.topic,
                attempt = self.attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after delay"
            );

            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = sleep(delay) => {}
            }
        }

        self.client.close().await;
        self.set_phase(ConnectionPhase::Closed);
        info!(topic = %self.topic, "Stream connection stopped");
    }

    /// Connect once and forward frames until the session ends
    async fn session(&mut self) -> SessionEnd {
        let connected = tokio::select! {
            _ = self.shutdown.changed() => return SessionEnd::Shutdown,
            res = timeout(self.settings.connect_timeout, self.client.connect()) => res,
        };
        match connected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return SessionEnd::Lost(e),
            Err(_) => return SessionEnd::Lost(MarketDataError::ConnectionTimeout),
        }

        self.session += 1;
        self.attempt = 0;
        self.set_phase(ConnectionPhase::Streaming);
        metrics::get()
            .stream_sessions
            .with_label_values(&[self.topic.as_str()])
            .inc();
        if self
            .events
            .send(StreamEvent::SessionStarted {
                session: self.session,
            })
            .is_err()
        {
            return SessionEnd::Shutdown;
        }

        loop {
            if *self.shutdown.borrow() {
                return SessionEnd::Shutdown;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return SessionEnd::Shutdown,
                Some(requested) = self.resync.recv() => {
                    if requested == self.session {
                        return SessionEnd::Resync;
                    }
                    debug!(
                        topic = %self.topic,
                        requested,
                        current = self.session,
                        "Ignoring resync for an earlier session"
                    );
                }
                frame = timeout(self.settings.recv_timeout, self.client.recv()) => match frame {
                    Ok(Ok(Some(text))) => {
                        metrics::get()
                            .stream_messages
                            .with_label_values(&[self.topic.as_str()])
                            .inc();
                        if self.events.send(StreamEvent::Message(text)).is_err() {
                            debug!(topic = %self.topic, "Event receiver dropped");
                            return SessionEnd::Shutdown;
                        }
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => return SessionEnd::Lost(e),
                    Err(_) => {
                        warn!(
                            topic = %self.topic,
                            timeout_secs = self.settings.recv_timeout.as_secs(),
                            "No message received within timeout, sending keepalive"
                        );
                        if let Err(e) = self.client.ping().await {
                            warn!(error = %e, "Failed to send keepalive ping, reconnecting");
                            return SessionEnd::Lost(MarketDataError::ConnectionTimeout);
                        }
                    }
                },
            }
        }
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        let attempt = self.attempt;
        self.state.send_modify(|state| {
            if let Some(state) = state.as_mut() {
                state.phase = phase;
                state.reconnect_attempt = attempt;
            }
        });
    }
}
