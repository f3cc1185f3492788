//! [`Transport`] over an upgraded axum WebSocket.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use switchboard_core::{FrameReader, FrameWriter, Transport, TransportError};
use tracing::debug;

use crate::metrics::ServerMetrics;

pub struct WsTransport {
    socket: WebSocket,
    metrics: Option<Arc<ServerMetrics>>,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            metrics: None,
        }
    }

    /// Count this connection as open until the writer half is dropped.
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        metrics.connection_opened();
        self.metrics = Some(metrics);
        self
    }
}

impl Transport for WsTransport {
    type Reader = WsReader;
    type Writer = WsWriter;

    fn split(self) -> (WsReader, WsWriter) {
        let (sink, stream) = self.socket.split();
        (
            WsReader {
                stream,
                metrics: self.metrics.clone(),
            },
            WsWriter {
                sink,
                closed: false,
                metrics: self.metrics,
            },
        )
    }
}

pub struct WsReader {
    stream: SplitStream<WebSocket>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl FrameReader for WsReader {
    async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(_))) => {
                    return Err(TransportError::Decode("binary frame".into()));
                }
                // axum answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Client sent close frame");
                    return Err(TransportError::Closed);
                }
                Some(Err(e)) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.websocket_error();
                    }
                    return Err(TransportError::Io(e.to_string()));
                }
                None => return Err(TransportError::Closed),
            }
        }
    }
}

pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
    metrics: Option<Arc<ServerMetrics>>,
}

impl FrameWriter for WsWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Peer may already be gone
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

impl Drop for WsWriter {
    fn drop(&mut self) {
        if let Some(metrics) = self.metrics.take() {
            metrics.connection_closed();
        }
    }
}
