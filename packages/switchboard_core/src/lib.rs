//! Switchboard core - agent/customer matchmaking and message routing
//!
//! This crate pairs waiting customer sessions with idle agent sessions and
//! routes text between the two parties of each pairing. It knows nothing about
//! HTTP or WebSockets: connections come in through the [`Transport`] trait.
//!
//! All matchmaking state lives inside one [`Coordinator`] task. Sessions only
//! talk to it through [`CoordinatorHandle`] events and drain their own bounded
//! outbound queue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchboard_core::{
//!     Coordinator, CoordinatorConfig, Intake, Role, SequentialIds, transport::channel,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = Coordinator::spawn(CoordinatorConfig::default());
//!     let intake = Intake::new(coordinator.clone(), Arc::new(SequentialIds::new()), 32);
//!
//!     let (transport, mut peer) = channel::pair();
//!     intake.admit(transport, Role::Agent, "Ada".into()).await.unwrap();
//!
//!     let (transport, _customer) = channel::pair();
//!     intake.admit(transport, Role::Customer, "Bob".into()).await.unwrap();
//!
//!     // {"id":0,"sender":"Server","body":"Bob has joined the chat!","system":true}
//!     println!("{}", peer.recv().await.unwrap());
//! }
//! ```

pub mod coordinator;
mod error;
mod identity;
mod intake;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transport;

pub use coordinator::{
    AgentEntry, Coordinator, CoordinatorConfig, CoordinatorEvent, CoordinatorHandle,
    CoordinatorSnapshot, RequeuePolicy, RoutingStats, SessionInfo,
};
pub use error::{CoordinatorError, TransportError};
pub use identity::{IdGenerator, SequentialIds, SessionId};
pub use intake::Intake;
pub use message::{Envelope, Role, SYSTEM_SENDER};
pub use session::{Session, SessionHandle};
pub use transport::{FrameReader, FrameWriter, Transport};
