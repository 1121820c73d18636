//! WebSocket transport.

use crate::transport::{Duplex, Transport, TransportEvent};
use async_trait::async_trait;
use eyre::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

/// Opens `ws://` / `wss://` connections to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Duplex> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("WebSocket connection to {} failed", self.url))?;
        log::debug!("WebSocket connected to {}", self.url);

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Writer: runs until the client drops its sender, then closes the socket.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    log::warn!("WebSocket send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards frames until the socket ends or the client stops listening.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let event = match frame {
                    Ok(WsMessage::Text(text)) => TransportEvent::Message(text),
                    Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => {
                            log::warn!("Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(WsMessage::Close(frame)) => {
                        log::debug!("WebSocket close frame: {:?}", frame);
                        let _ = in_tx.send(TransportEvent::Closed);
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if in_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(TransportEvent::Closed);
        });

        Ok(Duplex {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
