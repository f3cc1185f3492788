//! The matchmaking and routing coordinator.
//!
//! A single task owns the waiting queue, the agent pairing table and the
//! identity index. Everything else talks to it through [`CoordinatorHandle`],
//! and events are applied strictly one at a time.
//!
//! Invariants held between events:
//! - every registered agent has exactly one pairing-table entry
//! - a registered customer is either in the waiting queue or the partner of
//!   exactly one agent, never both
//! - every registered session appears in the identity index exactly once

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::identity::SessionId;
use crate::message::{Envelope, Role};
use crate::session::SessionHandle;

/// Inputs to the coordinator loop.
#[derive(Debug)]
pub enum CoordinatorEvent {
    RegisterAgent {
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    RegisterCustomer {
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    MessageReceived {
        sender: SessionId,
        body: String,
    },
    SessionDone(SessionId),
    /// Try to form one new pairing
    Poll,
    /// Read-only view of the current state
    Snapshot {
        respond_to: oneshot::Sender<CoordinatorSnapshot>,
    },
}

/// Where a customer goes when their agent disconnects mid-conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequeuePolicy {
    /// Back of the line, behind everyone already waiting
    #[default]
    Tail,
    /// Head of the line, ahead of fresh arrivals
    Front,
}

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Capacity of the shared event channel
    pub event_capacity: usize,
    /// How long a delivery may wait on a full session queue before that
    /// session is torn down as unresponsive
    pub delivery_timeout: Duration,
    pub requeue: RequeuePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            delivery_timeout: Duration::from_secs(5),
            requeue: RequeuePolicy::Tail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub role: Role,
}

impl From<&SessionHandle> for SessionInfo {
    fn from(handle: &SessionHandle) -> Self {
        Self {
            id: handle.id(),
            name: handle.name().to_string(),
            role: handle.role(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub agent: SessionInfo,
    /// `None` while the agent is idle
    pub customer: Option<SessionInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub messages_routed: u64,
    /// Messages whose sender had no counterpart at the time
    pub messages_dropped: u64,
    pub pairings_formed: u64,
    /// Sessions torn down because a delivery to them failed or timed out
    pub sessions_evicted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// Waiting customers, head first
    pub queue: Vec<SessionInfo>,
    /// Pairing table ordered by agent id
    pub agents: Vec<AgentEntry>,
    pub stats: RoutingStats,
}

impl CoordinatorSnapshot {
    pub fn queue_ids(&self) -> Vec<SessionId> {
        self.queue.iter().map(|s| s.id).collect()
    }

    pub fn idle_agents(&self) -> usize {
        self.agents.iter().filter(|e| e.customer.is_none()).count()
    }

    pub fn paired_count(&self) -> usize {
        self.agents.len() - self.idle_agents()
    }

    /// The customer currently paired with `agent`, if any.
    pub fn partner_of(&self, agent: SessionId) -> Option<SessionId> {
        self.agents
            .iter()
            .find(|e| e.agent.id == agent)
            .and_then(|e| e.customer.as_ref().map(|c| c.id))
    }
}

/// Cheap-to-clone handle for sending events to the coordinator.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorEvent>,
    stop: CancellationToken,
}

impl CoordinatorHandle {
    async fn send(&self, event: CoordinatorEvent) -> Result<(), CoordinatorError> {
        if self.stop.is_cancelled() {
            return Err(CoordinatorError::Stopped);
        }
        self.sender
            .send(event)
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }

    /// Resolves once the coordinator has accepted or rejected the session.
    pub async fn register_agent(&self, session: SessionHandle) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorEvent::RegisterAgent {
            session,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::Stopped)?
    }

    pub async fn register_customer(&self, session: SessionHandle) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorEvent::RegisterCustomer {
            session,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::Stopped)?
    }

    /// Register according to the session's role.
    pub async fn register(&self, session: SessionHandle) -> Result<(), CoordinatorError> {
        match session.role() {
            Role::Agent => self.register_agent(session).await,
            Role::Customer => self.register_customer(session).await,
        }
    }

    pub async fn message_received(
        &self,
        sender: SessionId,
        body: String,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorEvent::MessageReceived { sender, body })
            .await
    }

    pub async fn session_done(&self, id: SessionId) -> Result<(), CoordinatorError> {
        self.send(CoordinatorEvent::SessionDone(id)).await
    }

    pub async fn poll(&self) -> Result<(), CoordinatorError> {
        self.send(CoordinatorEvent::Poll).await
    }

    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorEvent::Snapshot { respond_to: tx })
            .await?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Stop the coordinator loop. Registered sessions are abandoned, not closed.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    receiver: mpsc::Receiver<CoordinatorEvent>,
    stop: CancellationToken,
    /// Identity index over both roles
    sessions: HashMap<SessionId, SessionHandle>,
    /// Pairing table: agent -> paired customer
    agents: BTreeMap<SessionId, Option<SessionId>>,
    /// Reverse pairing index: customer -> agent
    partners: HashMap<SessionId, SessionId>,
    queue: VecDeque<SessionId>,
    pending_polls: usize,
    evicted: VecDeque<SessionId>,
    stats: RoutingStats,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> (Self, CoordinatorHandle) {
        let (sender, receiver) = mpsc::channel(config.event_capacity.max(1));
        let stop = CancellationToken::new();
        let coordinator = Self {
            config,
            receiver,
            stop: stop.clone(),
            sessions: HashMap::new(),
            agents: BTreeMap::new(),
            partners: HashMap::new(),
            queue: VecDeque::new(),
            pending_polls: 0,
            evicted: VecDeque::new(),
            stats: RoutingStats::default(),
        };
        (coordinator, CoordinatorHandle { sender, stop })
    }

    /// Start the coordinator loop on the current runtime and return its handle.
    pub fn spawn(config: CoordinatorConfig) -> CoordinatorHandle {
        let (coordinator, handle) = Self::new(config);
        tokio::spawn(coordinator.run());
        handle
    }

    pub async fn run(mut self) {
        info!(requeue = ?self.config.requeue, "Coordinator started");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle_event(event).await;
            if self.stop.is_cancelled() {
                break;
            }
            self.settle().await;
        }

        info!(
            sessions = self.sessions.len(),
            waiting = self.queue.len(),
            "Coordinator stopped"
        );
    }

    async fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::RegisterAgent {
                session,
                respond_to,
            } => self.register_agent(session, respond_to),
            CoordinatorEvent::RegisterCustomer {
                session,
                respond_to,
            } => self.register_customer(session, respond_to).await,
            CoordinatorEvent::MessageReceived { sender, body } => self.route(sender, body).await,
            CoordinatorEvent::SessionDone(id) => self.session_done(id).await,
            CoordinatorEvent::Poll => self.poll().await,
            CoordinatorEvent::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Work raised while handling an event: teardown of unresponsive
    /// recipients first, then the poll requests.
    async fn settle(&mut self) {
        loop {
            if self.stop.is_cancelled() {
                return;
            }
            if let Some(id) = self.evicted.pop_front() {
                if self.sessions.contains_key(&id) {
                    warn!(session = %id, "Evicting unresponsive session");
                    self.stats.sessions_evicted += 1;
                    self.session_done(id).await;
                }
                continue;
            }
            if self.pending_polls > 0 {
                self.pending_polls -= 1;
                self.poll().await;
                continue;
            }
            break;
        }
    }

    fn request_poll(&mut self) {
        self.pending_polls += 1;
    }

    /// Index the session and answer the registering caller. The reply goes
    /// out before any delivery, so the caller can start draining right away.
    fn admit(
        &mut self,
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    ) -> bool {
        let id = session.id();
        if id.is_system() || self.sessions.contains_key(&id) {
            warn!(session = %id, "Rejecting duplicate or reserved session id");
            session.close();
            let _ = respond_to.send(Err(CoordinatorError::Rejected(id)));
            return false;
        }
        self.sessions.insert(id, session);
        let _ = respond_to.send(Ok(()));
        true
    }

    fn register_agent(
        &mut self,
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    ) {
        let id = session.id();
        let name = session.name().to_string();
        if !self.admit(session, respond_to) {
            return;
        }
        self.agents.insert(id, None);
        info!(session = %id, name = %name, "Agent registered");
        self.request_poll();
    }

    async fn register_customer(
        &mut self,
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    ) {
        let id = session.id();
        let name = session.name().to_string();
        if !self.admit(session, respond_to) {
            return;
        }
        info!(session = %id, name = %name, "Customer registered");
        self.enqueue(id, RequeuePolicy::Tail).await;
        self.request_poll();
    }

    async fn enqueue(&mut self, customer: SessionId, position: RequeuePolicy) {
        match position {
            RequeuePolicy::Tail => self.queue.push_back(customer),
            RequeuePolicy::Front => self.queue.push_front(customer),
        }
        debug!(session = %customer, waiting = self.queue.len(), "Customer queued");
        self.deliver(customer, Envelope::waiting()).await;
    }

    fn counterpart_of(&self, id: SessionId) -> Option<SessionId> {
        match self.agents.get(&id) {
            Some(customer) => *customer,
            None => self.partners.get(&id).copied(),
        }
    }

    async fn route(&mut self, sender: SessionId, body: String) {
        let (Some(name), Some(recipient)) = (
            self.sessions.get(&sender).map(|s| s.name().to_string()),
            self.counterpart_of(sender),
        ) else {
            // Partner gone or never paired; normal during teardown races
            debug!(session = %sender, "No counterpart, dropping message");
            self.stats.messages_dropped += 1;
            return;
        };

        if self.deliver(recipient, Envelope::new(sender, name, body)).await {
            self.stats.messages_routed += 1;
        }
    }

    /// Queue `envelope` on the recipient's outbound channel. A recipient that
    /// cannot take it in time is scheduled for eviction.
    async fn deliver(&mut self, recipient: SessionId, envelope: Envelope) -> bool {
        let Some(outbound) = self.sessions.get(&recipient).map(|s| s.outbound().clone()) else {
            return false;
        };

        let delivery = tokio::time::timeout(self.config.delivery_timeout, outbound.send(envelope));
        let result = tokio::select! {
            biased;
            // Stopping abandons the delivery; the recipient is not evicted
            _ = self.stop.cancelled() => return false,
            result = delivery => result,
        };

        match result {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                debug!(session = %recipient, "Outbound queue closed");
                self.evicted.push_back(recipient);
                false
            }
            Err(_) => {
                warn!(
                    session = %recipient,
                    timeout_ms = self.config.delivery_timeout.as_millis() as u64,
                    "Delivery timed out"
                );
                self.evicted.push_back(recipient);
                false
            }
        }
    }

    /// Remove a session from the identity index and close it.
    fn unregister(&mut self, id: SessionId) -> Option<SessionHandle> {
        let session = self.sessions.remove(&id)?;
        session.close();
        Some(session)
    }

    async fn session_done(&mut self, id: SessionId) {
        // Pairing-table keys
        if let Some(slot) = self.agents.remove(&id) {
            let agent_name = self
                .unregister(id)
                .map(|s| s.name().to_string())
                .unwrap_or_default();

            match slot {
                None => info!(session = %id, "Idle agent left"),
                Some(customer) => {
                    info!(session = %id, customer = %customer, "Paired agent left, requeueing customer");
                    self.partners.remove(&customer);
                    self.deliver(customer, Envelope::lost_connection(&agent_name))
                        .await;
                    let position = self.config.requeue;
                    self.enqueue(customer, position).await;
                    self.request_poll();
                }
            }
            return;
        }

        // Pairing-table values
        if let Some(agent) = self.partners.remove(&id) {
            if let Some(slot) = self.agents.get_mut(&agent) {
                *slot = None;
            }
            let customer_name = self
                .unregister(id)
                .map(|s| s.name().to_string())
                .unwrap_or_default();
            info!(session = %id, agent = %agent, "Paired customer left");
            self.deliver(agent, Envelope::left(&customer_name)).await;
            self.request_poll();
            return;
        }

        // Waiting queue
        if let Some(pos) = self.queue.iter().position(|c| *c == id) {
            self.queue.remove(pos);
            self.unregister(id);
            info!(session = %id, position = pos, "Queued customer left");
            return;
        }

        debug!(session = %id, "Already unregistered");
    }

    async fn poll(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        // Lowest id first: BTreeMap iterates in key order
        let Some(agent) = self
            .agents
            .iter()
            .find(|(_, customer)| customer.is_none())
            .map(|(agent, _)| *agent)
        else {
            debug!(waiting = self.queue.len(), "No idle agent");
            return;
        };
        let Some(customer) = self.queue.pop_front() else {
            return;
        };

        self.agents.insert(agent, Some(customer));
        self.partners.insert(customer, agent);
        self.stats.pairings_formed += 1;

        let agent_name = self.name_of(agent);
        let customer_name = self.name_of(customer);
        info!(agent = %agent, customer = %customer, "Paired");

        self.deliver(agent, Envelope::joined(&customer_name)).await;
        self.deliver(customer, Envelope::joined(&agent_name)).await;
    }

    fn name_of(&self, id: SessionId) -> String {
        self.sessions
            .get(&id)
            .map(|s| s.name().to_string())
            .unwrap_or_default()
    }

    fn info_of(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.get(&id).map(SessionInfo::from)
    }

    fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            queue: self.queue.iter().filter_map(|id| self.info_of(*id)).collect(),
            agents: self
                .agents
                .iter()
                .filter_map(|(agent, customer)| {
                    Some(AgentEntry {
                        agent: self.info_of(*agent)?,
                        customer: customer.and_then(|c| self.info_of(c)),
                    })
                })
                .collect(),
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
impl Coordinator {
    /// Pull one queued event without running the loop.
    pub(crate) fn try_next_event(&mut self) -> Option<CoordinatorEvent> {
        self.receiver.try_recv().ok()
    }
}
