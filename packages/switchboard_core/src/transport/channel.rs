//! In-memory transport backed by tokio channels.
//!
//! [`pair`] returns the session-side [`ChannelTransport`] and a [`ChannelPeer`]
//! that plays the remote party: it injects inbound frames and observes what
//! the session writes.

use tokio::sync::mpsc;

use super::{FrameReader, FrameWriter, Transport};
use crate::error::TransportError;

const DEFAULT_CAPACITY: usize = 32;

pub fn pair() -> (ChannelTransport, ChannelPeer) {
    pair_with_capacity(DEFAULT_CAPACITY)
}

pub fn pair_with_capacity(capacity: usize) -> (ChannelTransport, ChannelPeer) {
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    (
        ChannelTransport {
            inbound: in_rx,
            outbound: out_tx,
        },
        ChannelPeer {
            to_session: Some(in_tx),
            from_session: out_rx,
        },
    )
}

pub struct ChannelTransport {
    inbound: mpsc::Receiver<Result<String, TransportError>>,
    outbound: mpsc::Sender<String>,
}

impl Transport for ChannelTransport {
    type Reader = ChannelReader;
    type Writer = ChannelWriter;

    fn split(self) -> (ChannelReader, ChannelWriter) {
        (
            ChannelReader {
                inbound: self.inbound,
            },
            ChannelWriter {
                outbound: Some(self.outbound),
            },
        )
    }
}

pub struct ChannelReader {
    inbound: mpsc::Receiver<Result<String, TransportError>>,
}

impl FrameReader for ChannelReader {
    async fn recv(&mut self) -> Result<String, TransportError> {
        self.inbound.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}

pub struct ChannelWriter {
    outbound: Option<mpsc::Sender<String>>,
}

impl FrameWriter for ChannelWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let Some(tx) = self.outbound.as_ref() else {
            return Err(TransportError::Closed);
        };
        tx.send(text).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        self.outbound.take();
    }
}

/// The remote end of a [`ChannelTransport`].
pub struct ChannelPeer {
    to_session: Option<mpsc::Sender<Result<String, TransportError>>>,
    from_session: mpsc::Receiver<String>,
}

impl ChannelPeer {
    /// Deliver a text frame to the session's reader.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.inject(Ok(text.into())).await
    }

    /// Make the session's next read fail with `err`.
    pub async fn fail(&self, err: TransportError) -> Result<(), TransportError> {
        self.inject(Err(err)).await
    }

    async fn inject(&self, frame: Result<String, TransportError>) -> Result<(), TransportError> {
        let Some(tx) = self.to_session.as_ref() else {
            return Err(TransportError::Closed);
        };
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Hang up: the session's reader observes [`TransportError::Closed`].
    pub fn disconnect(&mut self) {
        self.to_session.take();
    }

    /// Next frame written by the session, or `None` once its writer is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_session.recv().await
    }

    /// Stop accepting frames while keeping the inbound side open: the
    /// session's next write fails with [`TransportError::Closed`].
    pub fn refuse_writes(&mut self) {
        self.from_session.close();
    }
}
