//! Subscription services exposed to the presentation layer
//!
//! A [`MarketService`] owns at most one live [`StreamConnection`] and one
//! consumer task that feeds raw frames through a [`StreamReducer`]. Results are
//! published through latest-value `watch` channels.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::StreamSettings;
use crate::error::{MarketDataError, Result};
use crate::orderbook::OrderBookSync;
use crate::ticker::TickerSync;
use crate::websocket::{
    ConnectionState, ConnectionStateCell, ResyncHandle, StreamConnection, StreamEvent,
};

/// Service streaming one symbol's order book
pub type OrderBookService = MarketService<OrderBookSync>;

/// Service streaming one symbol's 24h ticker
pub type TickerService = MarketService<TickerSync>;

/// What a reducer wants done with a message
#[derive(Debug)]
pub enum Reduction<T> {
    /// Publish a new latest value
    Publish(T),
    /// Drop the session and reconnect
    Resync,
    /// Nothing to publish
    Ignore,
}

/// Per-topic message reducer run on the consumer task
pub trait StreamReducer: Send + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn new(symbol: &str) -> Self;

    /// Stream topic for a symbol; rejects parameters the topic cannot carry
    fn topic(symbol: &str, levels: u32) -> Result<String>;

    /// Called when a new session begins, before any of its messages
    fn on_session_start(&mut self) {}

    fn on_message(&mut self, raw: &str) -> Reduction<Self::Output>;
}

struct Subscription {
    symbol: String,
    connection: StreamConnection,
    consumer: JoinHandle<()>,
}

/// Single-slot subscription service
pub struct MarketService<R: StreamReducer> {
    settings: StreamSettings,
    active: Mutex<Option<Subscription>>,
    closed: AtomicBool,
    connection: ConnectionStateCell,
    state: Arc<watch::Sender<Option<R::Output>>>,
    error: Arc<watch::Sender<Option<String>>>,
    _reducer: PhantomData<fn() -> R>,
}

impl<R: StreamReducer> MarketService<R> {
    pub fn new(settings: StreamSettings) -> Self {
        let (connection, _) = watch::channel(None);
        let (state, _) = watch::channel(None);
        let (error, _) = watch::channel(None);
        Self {
            settings,
            active: Mutex::new(None),
            closed: AtomicBool::new(false),
            connection: Arc::new(connection),
            state: Arc::new(state),
            error: Arc::new(error),
            _reducer: PhantomData,
        }
    }

    /// Subscribe to `symbol`.
    ///
    /// A no-op when the same topic is already active; otherwise any previous
    /// subscription is fully torn down before the new one starts.
    pub async fn connect(&self, symbol: &str, levels: u32) -> Result<()> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(MarketDataError::ConfigError("empty symbol".to_string()));
        }
        let topic = R::topic(&symbol, levels)?;

        let mut active = self.active.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(MarketDataError::ServiceClosed);
        }

        if let Some(current) = active.as_ref() {
            if current.connection.topic() == topic {
                debug!(symbol = %symbol, topic = %topic, "Already subscribed");
                return Ok(());
            }
        }

        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }

        let (connection, events) =
            StreamConnection::open(&self.settings, &symbol, &topic, self.connection.clone());
        let consumer = tokio::spawn(consume(
            R::new(&symbol),
            events,
            connection.resync_handle(),
            self.state.clone(),
            self.error.clone(),
        ));

        info!(symbol = %symbol, topic = %topic, "Subscribed");
        *active = Some(Subscription {
            symbol,
            connection,
            consumer,
        });
        Ok(())
    }

    /// Tear down the active subscription, if any, and clear all published state
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }
    }

    /// Disconnect and refuse further connects
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.disconnect().await;
    }

    async fn teardown(&self, subscription: Subscription) {
        let Subscription {
            symbol,
            connection,
            consumer,
        } = subscription;

        connection.close().await;
        consumer.abort();
        let _ = consumer.await;

        self.connection.send_replace(None);
        self.state.send_replace(None);
        self.error.send_replace(None);
        info!(symbol = %symbol, "Unsubscribed");
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .borrow()
            .as_ref()
            .map(ConnectionState::is_connected)
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn current_symbol(&self) -> Option<String> {
        self.connection.borrow().as_ref().map(|s| s.symbol.clone())
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection.borrow().clone()
    }

    pub fn watch_connection(&self) -> watch::Receiver<Option<ConnectionState>> {
        self.connection.subscribe()
    }

    /// Latest published value
    pub fn latest(&self) -> Option<R::Output> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<R::Output>> {
        self.state.subscribe()
    }

    /// Last connection error, cleared once a session is re-established
    pub fn error_message(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }
}

/// Consumer task: drives the reducer in receipt order
async fn consume<R: StreamReducer>(
    mut reducer: R,
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
    resync: ResyncHandle,
    state: Arc<watch::Sender<Option<R::Output>>>,
    error: Arc<watch::Sender<Option<String>>>,
) {
    // Session the messages being reduced belong to
    let mut session = 0;

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::SessionStarted { session: started } => {
                session = started;
                reducer.on_session_start();
                error.send_replace(None);
            }
            StreamEvent::Message(raw) => match reducer.on_message(&raw) {
                Reduction::Publish(value) => {
                    state.send_replace(Some(value));
                }
                Reduction::Resync => resync.request(session),
                Reduction::Ignore => {}
            },
            StreamEvent::ConnectionLost(reason) => {
                error.send_replace(Some(reason));
            }
        }
    }
}
