//! Request/response correlation on top of a [`ConnectionManager`].
//!
//! Exactly one request may be in flight. A single long-lived dispatcher task
//! consumes every decoded inbound message and routes it by `status` against
//! the current pending slot; nothing is re-registered per request.

use crate::connection::{ConnectionManager, ConnectionState, SendError};
use crate::normalize::{Answer, ErrorKind, normalize_answer};
use crate::protocol::{Envelope, Frame, RequestBody};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default bound on waiting for a `complete` frame, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Result of one request as seen by the consumer.
pub type Outcome = Result<Answer, ErrorKind>;

#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// How long to wait for `complete` after submitting (None = forever)
    pub request_timeout: Option<Duration>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }
}

/// Errors returned synchronously from [`Correlator::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    /// The connection is not open (or the correlator was closed).
    NotConnected,
    /// A previous request has not resolved yet.
    AlreadyPending,
    /// The envelope could not be serialized.
    Encode(String),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::NotConnected => write!(f, "not connected to the service"),
            SubmitError::AlreadyPending => write!(f, "a request is already in progress"),
            SubmitError::Encode(e) => write!(f, "failed to encode request: {}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<SendError> for SubmitError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NotConnected => SubmitError::NotConnected,
            SendError::Encode(e) => SubmitError::Encode(e),
        }
    }
}

/// Snapshot of the in-flight request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// The envelope as sent
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
    /// A `processing` frame has been seen
    pub acknowledged: bool,
}

/// Handle for the outcome of one submitted request.
#[derive(Debug)]
pub struct Ticket {
    rx: oneshot::Receiver<Outcome>,
}

impl Ticket {
    /// Wait for the outcome. `None` if the correlator was closed first.
    pub async fn wait(self) -> Option<Outcome> {
        self.rx.await.ok()
    }
}

struct Slot {
    request: PendingRequest,
    deadline: Option<Instant>,
    responder: oneshot::Sender<Outcome>,
}

struct Shared {
    connection: Arc<ConnectionManager>,
    config: CorrelatorConfig,
    disposed: AtomicBool,
    slot: Mutex<Option<Slot>>,
    rearm: Notify,
}

/// Submits one request at a time and resolves it from inbound frames.
pub struct Correlator {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Correlator {
    /// Attach to `connection` and start dispatching. Must be called within a Tokio runtime.
    pub fn new(connection: Arc<ConnectionManager>, config: CorrelatorConfig) -> Self {
        let messages = connection.subscribe_messages();
        let shared = Arc::new(Shared {
            connection,
            config,
            disposed: AtomicBool::new(false),
            slot: Mutex::new(None),
            rearm: Notify::new(),
        });

        let dispatcher = tokio::spawn(Arc::clone(&shared).dispatch(messages));

        Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// The connection this correlator sends through.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.shared.connection
    }

    /// Wrap `body` in a `startTask` envelope and send it.
    pub fn submit(&self, body: impl Into<RequestBody>) -> Result<Ticket, SubmitError> {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return Err(SubmitError::NotConnected);
        }

        let mut slot = lock(&self.shared.slot);
        if slot.is_some() {
            return Err(SubmitError::AlreadyPending);
        }
        if self.shared.connection.state() != ConnectionState::Open {
            return Err(SubmitError::NotConnected);
        }

        let envelope = Envelope::start_task(body);
        let payload = serde_json::to_value(&envelope).map_err(|e| SubmitError::Encode(e.to_string()))?;
        self.shared.connection.send(&payload)?;

        let (responder, rx) = oneshot::channel();
        *slot = Some(Slot {
            request: PendingRequest {
                payload,
                submitted_at: Utc::now(),
                acknowledged: false,
            },
            deadline: self.shared.config.request_timeout.map(|timeout| Instant::now() + timeout),
            responder,
        });
        drop(slot);

        log::info!("Request submitted");
        self.shared.rearm.notify_one();
        Ok(Ticket { rx })
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.shared.slot).is_some()
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        lock(&self.shared.slot).as_ref().map(|slot| slot.request.clone())
    }

    /// Dispose: drop any pending request unresolved, stop dispatching, close the connection.
    pub fn close(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = lock(&self.dispatcher).take() {
            handle.abort();
        }
        if lock(&self.shared.slot).take().is_some() {
            log::debug!("Discarding pending request on close");
        }
        self.shared.connection.close();
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn deadline(&self) -> Option<Instant> {
        lock(&self.slot).as_ref().and_then(|slot| slot.deadline)
    }

    async fn dispatch(self: Arc<Self>, mut messages: broadcast::Receiver<Value>) {
        loop {
            let deadline = self.deadline();
            let expiry = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                message = messages.recv() => match message {
                    Ok(message) => self.handle(&message),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Correlator fell behind; {} messages skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = expiry => self.expire(),
                _ = self.rearm.notified() => {}
            }
        }
    }

    fn handle(&self, message: &Value) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        match Frame::classify(message) {
            Frame::Processing { message } => {
                let mut slot = lock(&self.slot);
                match slot.as_mut() {
                    Some(slot) if !slot.request.acknowledged => {
                        slot.request.acknowledged = true;
                        log::debug!("Request acknowledged: {}", message.as_deref().unwrap_or(""));
                    }
                    Some(_) => log::debug!("Ignoring repeated processing frame"),
                    None => log::debug!("Ignoring processing frame with no pending request"),
                }
            }
            Frame::Complete { result } => {
                let Some(slot) = lock(&self.slot).take() else {
                    log::warn!("Ignoring complete frame with no pending request");
                    return;
                };
                let outcome = normalize_answer(result.as_ref());
                match &outcome {
                    Ok(Answer::Roadmap(graph)) => log::info!("Request complete: {} tasks", graph.len()),
                    Ok(Answer::Assignments(table)) => log::info!("Request complete: {} student assignments", table.len()),
                    Err(e) => log::warn!("Request complete but unusable: {}", e),
                }
                // The caller may have dropped its ticket.
                let _ = slot.responder.send(outcome);
            }
            Frame::Other => log::debug!("Ignoring frame without a known status"),
        }
    }

    fn expire(&self) {
        let mut slot = lock(&self.slot);
        let expired = slot
            .as_ref()
            .and_then(|slot| slot.deadline)
            .is_some_and(|deadline| deadline <= Instant::now());
        if !expired {
            return;
        }
        if let Some(slot) = slot.take() {
            log::warn!("Request timed out (submitted {})", slot.request.submitted_at.to_rfc3339());
            let _ = slot.responder.send(Err(ErrorKind::Timeout));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::transport::{MemoryPeer, MemoryTransport};
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(2);

    async fn connected(config: CorrelatorConfig) -> (Correlator, MemoryPeer) {
        let (transport, mut peers) = MemoryTransport::new();
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(transport),
            ConnectionConfig {
                reconnect_delay: Duration::from_millis(20),
                ..Default::default()
            },
        ));
        connection.open();
        let peer = peers.recv().await.unwrap();
        assert!(connection.wait_for_state(ConnectionState::Open, WAIT).await);
        (Correlator::new(connection, config), peer)
    }

    fn complete(text: &str) -> Value {
        json!({"status": "complete", "result": {"text": text}})
    }

    #[tokio::test]
    async fn test_submit_sends_envelope() {
        let (correlator, mut peer) = connected(CorrelatorConfig::default()).await;
        let _ticket = correlator.submit(json!({"goal": "learn rust"})).unwrap();

        let sent: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(sent, json!({"action": "startTask", "body": {"goal": "learn rust"}}));
        assert!(correlator.is_pending());
        assert_eq!(correlator.pending().unwrap().payload, sent);
    }

    #[tokio::test]
    async fn test_second_submit_is_rejected() {
        let (correlator, peer) = connected(CorrelatorConfig::default()).await;
        let ticket = correlator.submit("first").unwrap();
        assert_eq!(correlator.submit("second").unwrap_err(), SubmitError::AlreadyPending);

        peer.push_json(&complete(r#"{"tasks": [{"id": 1}]}"#));
        let outcome = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap().roadmap().unwrap().len(), 1);

        assert!(!correlator.is_pending());
        assert!(correlator.submit("third").is_ok());
    }

    #[tokio::test]
    async fn test_processing_acknowledges_without_resolving() {
        let (correlator, peer) = connected(CorrelatorConfig::default()).await;
        let ticket = correlator.submit("go").unwrap();

        peer.push_json(&json!({"status": "processing", "message": "Task started!"}));
        peer.push_json(&json!({"status": "queued"}));
        let deadline = Instant::now() + WAIT;
        while !correlator.pending().unwrap().acknowledged {
            assert!(Instant::now() < deadline, "processing frame never seen");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(correlator.is_pending());

        peer.push_json(&complete(r#"{"tasks": []}"#));
        let outcome = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
        assert!(outcome.unwrap().roadmap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refusal_frees_slot() {
        let (correlator, peer) = connected(CorrelatorConfig::default()).await;
        let ticket = correlator.submit("go").unwrap();

        peer.push_json(&complete("Sorry, I cannot assist with that request."));
        let outcome = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
        assert!(matches!(outcome, Err(ErrorKind::ServerRefused(_))));
        assert!(correlator.submit("again").is_ok());
    }

    #[tokio::test]
    async fn test_submit_requires_open_connection() {
        let (transport, _peers) = MemoryTransport::new();
        let connection = Arc::new(ConnectionManager::new(Arc::new(transport), ConnectionConfig::default()));
        let correlator = Correlator::new(connection, CorrelatorConfig::default());
        assert_eq!(correlator.submit("go").unwrap_err(), SubmitError::NotConnected);
        assert!(!correlator.is_pending());
    }

    #[tokio::test]
    async fn test_timeout_resolves_and_frees_slot() {
        let config = CorrelatorConfig {
            request_timeout: Some(Duration::from_millis(50)),
        };
        let (correlator, _peer) = connected(config).await;
        let ticket = correlator.submit("go").unwrap();

        let outcome = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap_err(), ErrorKind::Timeout);
        assert!(!correlator.is_pending());
    }

    #[tokio::test]
    async fn test_unsolicited_complete_is_ignored() {
        let (correlator, peer) = connected(CorrelatorConfig::default()).await;
        peer.push_json(&complete(r#"{"tasks": []}"#));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ticket = correlator.submit("go").unwrap();
        peer.push_json(&complete(r#"{"tasks": [{"id": 7}]}"#));
        let outcome = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
        assert!(outcome.unwrap().roadmap().unwrap().contains("7"));
    }

    #[tokio::test]
    async fn test_close_discards_pending_request() {
        let (correlator, peer) = connected(CorrelatorConfig::default()).await;
        let ticket = correlator.submit("go").unwrap();

        correlator.close();
        assert!(!correlator.is_pending());
        assert_eq!(correlator.connection().state(), ConnectionState::Closed);
        assert!(ticket.wait().await.is_none());

        // Frames after disposal go nowhere.
        peer.push_json(&complete(r#"{"tasks": []}"#));
        assert_eq!(correlator.submit("again").unwrap_err(), SubmitError::NotConnected);
    }
}
