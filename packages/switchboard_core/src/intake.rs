use std::sync::Arc;
use tracing::info;

use crate::coordinator::CoordinatorHandle;
use crate::error::CoordinatorError;
use crate::identity::{IdGenerator, SessionId};
use crate::message::Role;
use crate::session::Session;
use crate::transport::Transport;

/// Turns accepted connections into running, registered sessions.
#[derive(Clone)]
pub struct Intake {
    coordinator: CoordinatorHandle,
    ids: Arc<dyn IdGenerator>,
    outbound_capacity: usize,
}

impl Intake {
    pub fn new(
        coordinator: CoordinatorHandle,
        ids: Arc<dyn IdGenerator>,
        outbound_capacity: usize,
    ) -> Self {
        Self {
            coordinator,
            ids,
            outbound_capacity,
        }
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Assign an id, register the session with the coordinator and start its
    /// loops.
    ///
    /// Registration happens before the loops start, so a peer that drops
    /// immediately still produces a `SessionDone` the coordinator can match.
    /// On error (coordinator stopped, or the id rejected as duplicate or
    /// reserved) the transport is dropped and nothing is registered.
    pub async fn admit<T: Transport>(
        &self,
        transport: T,
        role: Role,
        name: String,
    ) -> Result<SessionId, CoordinatorError> {
        let id = self.ids.next_id();
        let session = Session::new(id, role, name, transport, self.outbound_capacity);
        let handle = session.handle();

        self.coordinator.register(handle.clone()).await?;
        info!(session = %id, role = %role, name = %handle.name(), "Session admitted");

        // Loops detach; the coordinator reaches them through the handle
        let _tasks = session.start(self.coordinator.clone());
        Ok(id)
    }
}
