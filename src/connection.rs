//! Connection lifecycle for the single duplex channel of a session.
//!
//! The manager owns the channel handle. It:
//! - opens the channel through a [`Transport`]
//! - decodes every inbound frame as JSON once and broadcasts it
//! - reconnects after a fixed delay when the channel closes or fails
//! - stops for good once closed, cancelling any pending reconnect
//!
//! All state changes go through one guarded transition, so nothing moves the
//! state after [`ConnectionManager::close`] has run.

use crate::transport::{Transport, TransportEvent};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Default delay before a reconnect attempt, in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Default bound on a single connect attempt, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Capacity of the message and state broadcast channels.
const CHANNEL_CAPACITY: usize = 256;

/// Lifecycle state of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    /// Terminal; reached only through `close()`.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Reconnection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay between losing the channel and the next attempt
    pub reconnect_delay: Duration,

    /// Consecutive failures tolerated before giving up (None = never give up)
    pub max_reconnect_attempts: Option<u32>,

    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_attempts: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

/// Errors from [`ConnectionManager::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// The channel is not open.
    NotConnected,
    /// The message could not be serialized.
    Encode(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::NotConnected => write!(f, "not connected"),
            SendError::Encode(e) => write!(f, "failed to encode message: {}", e),
        }
    }
}

impl std::error::Error for SendError {}

struct Shared {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    disposed: AtomicBool,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    messages: broadcast::Sender<Value>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

/// Owns one duplex channel and keeps it open until closed.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state. Nothing connects until [`open`](Self::open).
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (messages, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                disposed: AtomicBool::new(false),
                state,
                transitions,
                messages,
                outbound: Mutex::new(None),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start connecting. No-op if already running or closed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(&self) {
        if self.shared.is_disposed() {
            log::debug!("open() ignored: connection manager is closed");
            return;
        }

        let mut driver = lock(&self.driver);
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        *driver = Some(tokio::spawn(async move { shared.drive().await }));
    }

    /// Close for good: cancel any reconnect, drop the channel, enter `Closed`.
    pub fn close(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = lock(&self.driver).take() {
            handle.abort();
        }
        self.shared.clear_outbound();

        let transitions = &self.shared.transitions;
        self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                return false;
            }
            log::info!("Connection closed ({} -> closed)", state);
            *state = ConnectionState::Closed;
            let _ = transitions.send(ConnectionState::Closed);
            true
        });
    }

    /// Serialize `message` and send it on the open channel.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), SendError> {
        if self.state() != ConnectionState::Open {
            return Err(SendError::NotConnected);
        }
        let text = serde_json::to_string(message).map_err(|e| SendError::Encode(e.to_string()))?;

        let outbound = lock(&self.shared.outbound);
        match outbound.as_ref() {
            Some(tx) => tx.send(text).map_err(|_| SendError::NotConnected),
            None => Err(SendError::NotConnected),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// True once `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Every transition, in order, from now on.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.transitions.subscribe()
    }

    /// Latest-value view of the state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Every decoded inbound message, from now on.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Value> {
        self.shared.messages.subscribe()
    }

    /// Wait until the state equals `target`. Returns false on timeout.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.watch_state();
        tokio::time::timeout(timeout, rx.wait_for(|state| *state == target))
            .await
            .is_ok_and(|r| r.is_ok())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Move to `next` unless closed. Returns whether the state is now `next`.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|state| {
            if self.is_disposed() || *state == ConnectionState::Closed {
                return false;
            }
            applied = true;
            if *state == next {
                return false;
            }
            log::debug!("Connection {} -> {}", state, next);
            *state = next;
            let _ = self.transitions.send(next);
            true
        });
        applied
    }

    fn clear_outbound(&self) {
        lock(&self.outbound).take();
    }

    fn deliver(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                // No subscribers is fine.
                let _ = self.messages.send(value);
            }
            Err(e) => log::warn!("Dropping undecodable frame ({}): {:.200}", e, text),
        }
    }

    /// Connect, pump messages, and reconnect until closed or out of attempts.
    async fn drive(self: Arc<Self>) {
        let mut failures: u32 = 0;

        loop {
            if !self.transition(ConnectionState::Connecting) {
                break;
            }

            match tokio::time::timeout(self.config.connect_timeout, self.transport.connect()).await {
                Ok(Ok(duplex)) => {
                    let mut inbound = duplex.inbound;
                    *lock(&self.outbound) = Some(duplex.outbound);
                    if !self.transition(ConnectionState::Open) {
                        self.clear_outbound();
                        break;
                    }
                    failures = 0;
                    log::info!("Connection open");

                    let reason = loop {
                        match inbound.recv().await {
                            Some(TransportEvent::Message(text)) => self.deliver(&text),
                            Some(TransportEvent::Error(e)) => break format!("transport error: {}", e),
                            Some(TransportEvent::Closed) | None => break "closed by peer".to_string(),
                        }
                    };
                    log::warn!("Connection lost: {}", reason);
                }
                Ok(Err(e)) => log::warn!("Connect attempt failed: {:#}", e),
                Err(_) => log::warn!(
                    "Connect attempt timed out after {:?}",
                    self.config.connect_timeout
                ),
            }

            self.clear_outbound();
            failures += 1;

            if self.config.max_reconnect_attempts.is_some_and(|max| failures > max) {
                log::error!("Giving up after {} consecutive failed connection attempts", failures);
                self.transition(ConnectionState::Disconnected);
                break;
            }

            if !self.transition(ConnectionState::Reconnecting) {
                break;
            }
            log::info!("Reconnecting in {:?}", self.config.reconnect_delay);
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
