//! Role and message envelope value types shared by sessions and the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::SessionId;

/// Display name used for coordinator-authored notices.
pub const SYSTEM_SENDER: &str = "Server";

/// Which side of a conversation a session is on. Fixed at connect time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Customer,
}

impl Role {
    /// Classify a connection from its `Type` header.
    ///
    /// `S` (support) or `agent` in any case marks an agent; everything else,
    /// including a missing header, is a customer.
    pub fn from_type_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("s") || v.eq_ignore_ascii_case("agent") => {
                Role::Agent
            }
            _ => Role::Customer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Agent => f.write_str("agent"),
            Role::Customer => f.write_str("customer"),
        }
    }
}

/// A routed message. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    sender_id: SessionId,
    sender: String,
    body: String,
    system: bool,
}

impl Envelope {
    pub fn new(sender_id: SessionId, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender_id,
            sender: sender.into(),
            body: body.into(),
            system: false,
        }
    }

    /// A coordinator notice attributed to [`SYSTEM_SENDER`].
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            sender_id: SessionId::SYSTEM,
            sender: SYSTEM_SENDER.to_string(),
            body: body.into(),
            system: true,
        }
    }

    pub fn waiting() -> Self {
        Self::system("Waiting for support user to join chat...")
    }

    pub fn joined(name: &str) -> Self {
        Self::system(format!("{} has joined the chat!", name))
    }

    pub fn lost_connection(name: &str) -> Self {
        Self::system(format!("{} has lost connection...", name))
    }

    pub fn left(name: &str) -> Self {
        Self::system(format!("{} has left the chat!", name))
    }

    pub fn sender_id(&self) -> SessionId {
        self.sender_id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_system(&self) -> bool {
        self.system
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.body)
    }
}
