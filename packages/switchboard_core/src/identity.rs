use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identifier for a connected session
///
/// Ids are never reused during the process lifetime. Ordering follows the
/// order in which ids were handed out by a [`SequentialIds`] generator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Sentinel sender of coordinator-authored messages. Never assigned to a session.
    pub const SYSTEM: SessionId = SessionId(0);

    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Source of fresh session ids, owned by whoever admits connections.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> SessionId;
}

/// Monotonic counter starting at 1 (0 is reserved for [`SessionId::SYSTEM`]).
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start counting at `first`. A zero start is bumped to 1.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
