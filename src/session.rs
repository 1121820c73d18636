//! One active session: a connection manager injected into a correlator.

use crate::config::Config;
use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::correlator::{Correlator, CorrelatorConfig, Outcome, PendingRequest, SubmitError, Ticket};
use crate::protocol::RequestBody;
use crate::transport::Transport;
use crate::ws::WebSocketTransport;
use eyre::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Owns the connection for its lifetime; dropping the session tears it down.
pub struct Session {
    correlator: Correlator,
}

impl Session {
    /// Build a session over `transport` and start connecting.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, connection: ConnectionConfig, requests: CorrelatorConfig) -> Self {
        let manager = Arc::new(ConnectionManager::new(transport, connection));
        let correlator = Correlator::new(Arc::clone(&manager), requests);
        manager.open();
        Self { correlator }
    }

    /// Session against the configured WebSocket endpoint.
    pub fn from_config(config: &Config) -> Self {
        log::info!("Starting session against {}", config.endpoint);
        Self::start(
            Arc::new(WebSocketTransport::new(config.endpoint.clone())),
            config.connection.to_connection_config(),
            config.request.to_correlator_config(),
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.correlator.connection().state()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.correlator.connection().subscribe_state()
    }

    /// Wait for the channel to open.
    pub async fn wait_open(&self, timeout: Duration) -> Result<()> {
        if self
            .correlator
            .connection()
            .wait_for_state(ConnectionState::Open, timeout)
            .await
        {
            Ok(())
        } else {
            bail!("Could not connect within {:?} (state: {})", timeout, self.state())
        }
    }

    pub fn submit(&self, body: impl Into<RequestBody>) -> Result<Ticket, SubmitError> {
        self.correlator.submit(body)
    }

    /// Submit and wait for the outcome.
    pub async fn request(&self, body: impl Into<RequestBody>) -> Result<Outcome> {
        let ticket = self.submit(body).map_err(|e| eyre::eyre!("Request rejected: {}", e))?;
        match ticket.wait().await {
            Some(outcome) => Ok(outcome),
            None => bail!("Session closed before the request completed"),
        }
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.correlator.pending()
    }

    pub fn close(&self) {
        self.correlator.close();
    }
}
