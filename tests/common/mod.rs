//! Shared test infrastructure for roadmap integration tests.
//!
//! Provides TestEnv (store in a temp dir) and SessionEnv (session over an
//! in-memory transport with a scripted service side).

#![allow(dead_code)]

use roadmap::{
    ConnectionConfig, ConnectionState, CorrelatorConfig, MemoryPeer, MemoryTransport, SavedRoadmap, Session, Store,
    TaskGraph, normalize,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Generous bound for anything that should happen "soon".
pub const WAIT: Duration = Duration::from_secs(2);

/// Reconnect delay used by test sessions.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    /// Drop the store and open it again from disk.
    pub fn reopen(self) -> Self {
        let TestEnv { temp_dir, store } = self;
        drop(store);
        let store = Store::open(temp_dir.path()).expect("Failed to reopen store");
        Self { temp_dir, store }
    }

    /// Save a graph built from a `{"tasks": [...]}` value.
    pub fn save(&mut self, title: &str, tasks: Value) -> SavedRoadmap {
        self.store.save(title, &graph(tasks)).expect("Failed to save roadmap")
    }

    pub fn roadmap_count(&self) -> usize {
        self.store.list().expect("Failed to list roadmaps").len()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a `{"tasks": [...]}` document sent as `content`.
pub fn graph(tasks: Value) -> TaskGraph {
    normalize(Some(&json!({ "content": tasks.to_string() }))).expect("Failed to normalize tasks")
}

/// `complete` frame carrying `text`.
pub fn complete_text(text: &str) -> Value {
    json!({"status": "complete", "result": {"text": text}})
}

/// `complete` frame carrying a task document as an encoded `content` string.
pub fn complete_tasks(tasks: Value) -> Value {
    json!({"status": "complete", "result": {"content": tasks.to_string()}})
}

pub fn processing() -> Value {
    json!({"status": "processing", "message": "Task started!"})
}

/// A session over a memory transport, plus the service side of each connection.
pub struct SessionEnv {
    pub transport: MemoryTransport,
    pub peers: mpsc::UnboundedReceiver<MemoryPeer>,
    pub session: Session,
}

impl SessionEnv {
    pub fn new() -> Self {
        Self::with_correlator(CorrelatorConfig::default())
    }

    pub fn with_correlator(requests: CorrelatorConfig) -> Self {
        let (transport, peers) = MemoryTransport::new();
        let session = Session::start(
            Arc::new(transport.clone()),
            ConnectionConfig {
                reconnect_delay: RECONNECT_DELAY,
                ..Default::default()
            },
            requests,
        );
        Self {
            transport,
            peers,
            session,
        }
    }

    /// Wait for the next connection and return its service side.
    pub async fn accept(&mut self) -> MemoryPeer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("Timed out waiting for a connection")
            .expect("Transport dropped")
    }

    /// Wait until the session reports `Open`.
    pub async fn wait_open(&self) {
        self.session.wait_open(WAIT).await.expect("Session never opened");
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }
}

impl Default for SessionEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the next outbound frame as JSON.
pub async fn next_request(peer: &mut MemoryPeer) -> Value {
    let text = tokio::time::timeout(WAIT, peer.recv())
        .await
        .expect("Timed out waiting for a request")
        .expect("Client closed the channel");
    serde_json::from_str(&text).expect("Request is not JSON")
}
