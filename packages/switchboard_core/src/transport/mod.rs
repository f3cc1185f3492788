//! Duplex text-frame transport abstraction.
//!
//! A session splits its transport into a reader and a writer so the inbound
//! and outbound loops can run independently. The server package implements
//! these traits for axum WebSockets; [`channel`] provides an in-memory pair.

pub mod channel;

use std::future::Future;

use crate::error::TransportError;

/// Receiving half of a connection.
pub trait FrameReader: Send + 'static {
    /// Wait for the next decoded text frame.
    ///
    /// A clean close from the peer is reported as [`TransportError::Closed`].
    fn recv(&mut self) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Sending half of a connection.
pub trait FrameWriter: Send + 'static {
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the underlying stream. Calling it more than once is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// A connected duplex stream that can be split into independent halves.
pub trait Transport: Send + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}
