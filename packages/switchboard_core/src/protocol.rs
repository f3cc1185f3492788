//! Wire format for text frames.
//!
//! Server → client: one JSON [`ServerFrame`] per envelope.
//! Client → server: a JSON [`ClientFrame`], or any other text taken verbatim
//! as the message body (older clients send plain lines).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::Envelope;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Sender session id (0 for system notices)
    pub id: u64,
    pub sender: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub system: bool,
}

impl From<&Envelope> for ServerFrame {
    fn from(env: &Envelope) -> Self {
        Self {
            id: env.sender_id().0,
            sender: env.sender().to_string(),
            body: env.body().to_string(),
            system: env.is_system(),
        }
    }
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub body: String,
}

pub fn encode_envelope(env: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerFrame::from(env))
}

/// Extract the message body from an inbound text frame.
///
/// Returns `None` for frames with nothing to route (empty or whitespace-only body).
pub fn decode_inbound(text: &str) -> Option<String> {
    let body = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame.body,
        Err(_) => text.to_string(),
    };
    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}
