use crate::identity::SessionId;

/// Failure of one session's duplex stream.
///
/// Any of these ends the owning session; none of them is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the stream (clean close frame or EOF)
    #[error("connection closed")]
    Closed,

    /// Read or write failure on the underlying stream
    #[error("transport I/O error: {0}")]
    Io(String),

    /// A frame arrived that cannot be turned into text
    #[error("undecodable frame: {0}")]
    Decode(String),
}

/// Errors returned by [`CoordinatorHandle`](crate::CoordinatorHandle) calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The coordinator loop has stopped and no longer accepts events
    #[error("coordinator has stopped")]
    Stopped,

    /// Registration refused: the id is already registered or reserved
    #[error("{0} rejected: duplicate or reserved id")]
    Rejected(SessionId),
}
