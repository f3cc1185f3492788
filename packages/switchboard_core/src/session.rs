//! One connected party: an inbound read loop and an outbound write loop.
//!
//! A session never touches coordinator state. The read loop turns frames into
//! `MessageReceived` events, the write loop drains the bounded outbound queue
//! the coordinator fills. Whichever loop fails first reports `SessionDone`;
//! the report is sent at most once per session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::coordinator::CoordinatorHandle;
use crate::identity::SessionId;
use crate::message::{Envelope, Role};
use crate::protocol;
use crate::transport::{FrameReader, FrameWriter, Transport};

/// The coordinator's view of a session: identity plus the two levers it may
/// pull (queue a delivery, request teardown).
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    role: Role,
    name: String,
    outbound: mpsc::Sender<Envelope>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        role: Role,
        name: impl Into<String>,
        outbound: mpsc::Sender<Envelope>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            role,
            name: name.into(),
            outbound,
            shutdown,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outbound(&self) -> &mpsc::Sender<Envelope> {
        &self.outbound
    }

    /// Ask both loops to stop and the writer to close the stream. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// A session that has been built but whose loops are not running yet.
pub struct Session<T: Transport> {
    handle: SessionHandle,
    transport: T,
    outbound_rx: mpsc::Receiver<Envelope>,
}

impl<T: Transport> Session<T> {
    pub fn new(
        id: SessionId,
        role: Role,
        name: impl Into<String>,
        transport: T,
        outbound_capacity: usize,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        Self {
            handle: SessionHandle::new(id, role, name, outbound_tx, CancellationToken::new()),
            transport,
            outbound_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Spawn the read and write loops. Events go to `coordinator`.
    pub fn start(self, coordinator: CoordinatorHandle) -> SessionTasks {
        let Session {
            handle,
            transport,
            outbound_rx,
        } = self;
        let (reader, writer) = transport.split();

        let done = DoneReporter {
            id: handle.id,
            coordinator: coordinator.clone(),
            reported: Arc::new(AtomicBool::new(false)),
            shutdown: handle.shutdown.clone(),
        };

        let inbound = tokio::spawn(inbound_loop(
            reader,
            handle.id,
            coordinator,
            done.clone(),
            handle.shutdown.clone(),
        ));
        let outbound = tokio::spawn(outbound_loop(
            writer,
            outbound_rx,
            handle.id,
            done,
            handle.shutdown.clone(),
        ));

        SessionTasks { inbound, outbound }
    }
}

/// Join handles for a running session's loops.
pub struct SessionTasks {
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl SessionTasks {
    /// Wait until both loops have exited.
    pub async fn join(self) {
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }
}

/// Sends `SessionDone` for one session at most once, and not at all once the
/// coordinator itself has closed the session.
#[derive(Clone)]
struct DoneReporter {
    id: SessionId,
    coordinator: CoordinatorHandle,
    reported: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl DoneReporter {
    async fn report(&self) {
        if self.shutdown.is_cancelled() || self.reported.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.coordinator.session_done(self.id).await.is_err() {
            debug!(session = %self.id, "coordinator gone, done report dropped");
        }
    }
}

async fn inbound_loop<R: FrameReader>(
    mut reader: R,
    id: SessionId,
    coordinator: CoordinatorHandle,
    done: DoneReporter,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = reader.recv() => frame,
        };

        match frame {
            Ok(text) => {
                let Some(body) = protocol::decode_inbound(&text) else {
                    continue;
                };
                if coordinator.message_received(id, body).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(session = %id, error = %e, "read loop ending");
                done.report().await;
                break;
            }
        }
    }
    debug!(session = %id, "read loop exited");
}

async fn outbound_loop<W: FrameWriter>(
    mut writer: W,
    mut queue: mpsc::Receiver<Envelope>,
    id: SessionId,
    done: DoneReporter,
    shutdown: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            envelope = queue.recv() => envelope,
        };
        let Some(envelope) = envelope else {
            break;
        };

        let text = match protocol::encode_envelope(&envelope) {
            Ok(text) => text,
            Err(e) => {
                error!(session = %id, "Failed to serialize envelope: {}", e);
                continue;
            }
        };

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = writer.send(text) => result,
        };
        if let Err(e) = result {
            warn!(session = %id, error = %e, "write failed");
            done.report().await;
            break;
        }
    }

    writer.close().await;
    debug!(session = %id, "write loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig, CoordinatorEvent};
    use crate::error::TransportError;
    use crate::protocol::ServerFrame;
    use crate::transport::channel;
    use std::time::Duration;

    fn frame(text: &str) -> ServerFrame {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_handle_close_is_idempotent() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = SessionHandle::new(
            SessionId(1),
            Role::Agent,
            "Ada",
            tx,
            CancellationToken::new(),
        );
        assert!(!handle.is_closed());
        handle.close();
        handle.close();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_deliveries_are_written_as_json() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());
        let (transport, mut peer) = channel::pair();
        let session = Session::new(SessionId(9), Role::Agent, "Ada", transport, 4);
        let handle = session.handle();
        let _tasks = session.start(coordinator.clone());

        handle
            .outbound()
            .send(Envelope::new(SessionId(2), "Bob", "hello"))
            .await
            .unwrap();

        let written = frame(&peer.recv().await.unwrap());
        assert_eq!(written.id, 2);
        assert_eq!(written.sender, "Bob");
        assert_eq!(written.body, "hello");
    }

    #[tokio::test]
    async fn test_close_stops_both_loops_and_closes_stream() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());
        let (transport, mut peer) = channel::pair();
        let session = Session::new(SessionId(4), Role::Customer, "Bob", transport, 4);
        let handle = session.handle();
        let tasks = session.start(coordinator.clone());

        handle.close();
        tasks.join().await;

        // Writer closed: the peer sees end-of-stream
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_failure_reports_done_once() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());
        let (transport, mut peer) = channel::pair();
        let session = Session::new(SessionId(5), Role::Customer, "Bob", transport, 4);
        coordinator.register_customer(session.handle()).await.unwrap();
        let _tasks = session.start(coordinator.clone());

        // Waiting notice arrives first
        let waiting = frame(&peer.recv().await.unwrap());
        assert!(waiting.system);

        peer.fail(TransportError::Io("reset".into())).await.unwrap();

        // The coordinator unregisters the customer and closes the stream
        assert_eq!(peer.recv().await, None);
        let snap = coordinator.snapshot().await.unwrap();
        assert!(snap.queue.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_reports_done() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());
        let (transport, mut peer) = channel::pair();
        let session = Session::new(SessionId(6), Role::Agent, "Ada", transport, 4);
        let handle = session.handle();
        coordinator.register_agent(session.handle()).await.unwrap();
        let tasks = session.start(coordinator.clone());

        peer.refuse_writes();
        handle
            .outbound()
            .send(Envelope::new(SessionId(2), "Bob", "hello"))
            .await
            .unwrap();

        // The failed write unregisters the agent and the coordinator closes it
        tokio::time::timeout(Duration::from_secs(5), async {
            while !coordinator.snapshot().await.unwrap().agents.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("agent still registered");
        tokio::time::timeout(Duration::from_secs(5), tasks.join())
            .await
            .expect("loops still running");
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_read_and_write_failing_together_tear_down_once() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());

        let (agent_transport, mut agent_peer) = channel::pair();
        let agent = Session::new(SessionId(1), Role::Agent, "Ada", agent_transport, 8);
        coordinator.register_agent(agent.handle()).await.unwrap();
        let _agent_tasks = agent.start(coordinator.clone());

        let (customer_transport, mut customer_peer) = channel::pair();
        let customer = Session::new(SessionId(2), Role::Customer, "Bob", customer_transport, 8);
        coordinator.register_customer(customer.handle()).await.unwrap();
        let _customer_tasks = customer.start(coordinator.clone());

        assert_eq!(
            frame(&agent_peer.recv().await.unwrap()).body,
            "Bob has joined the chat!"
        );
        customer_peer.recv().await.unwrap(); // waiting
        customer_peer.recv().await.unwrap(); // joined

        // The agent's message makes the customer's write fail while its read
        // fails too
        customer_peer.refuse_writes();
        agent_peer.send("still there?").await.unwrap();
        customer_peer
            .fail(TransportError::Io("reset".into()))
            .await
            .unwrap();

        let left = frame(&agent_peer.recv().await.unwrap());
        assert!(left.system);
        assert_eq!(left.body, "Bob has left the chat!");
        assert!(
            tokio::time::timeout(Duration::from_millis(100), agent_peer.recv())
                .await
                .is_err(),
            "agent got a second frame after the customer left"
        );

        let snap = coordinator.snapshot().await.unwrap();
        assert_eq!(snap.idle_agents(), 1);
        assert!(snap.queue.is_empty());
        assert_eq!(snap.stats.sessions_evicted, 0);
    }

    #[tokio::test]
    async fn test_done_reporter_sends_once_across_clones() {
        let (mut coordinator, handle) = Coordinator::new(CoordinatorConfig::default());
        let done = DoneReporter {
            id: SessionId(3),
            coordinator: handle,
            reported: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        };
        let other = done.clone();

        tokio::join!(done.report(), other.report());

        assert!(matches!(
            coordinator.try_next_event(),
            Some(CoordinatorEvent::SessionDone(SessionId(3)))
        ));
        assert!(coordinator.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_done_reporter_is_silent_after_close() {
        let (mut coordinator, handle) = Coordinator::new(CoordinatorConfig::default());
        let shutdown = CancellationToken::new();
        let done = DoneReporter {
            id: SessionId(3),
            coordinator: handle,
            reported: Arc::new(AtomicBool::new(false)),
            shutdown: shutdown.clone(),
        };

        shutdown.cancel();
        done.report().await;

        assert!(coordinator.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_empty_frames_are_not_forwarded() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());

        let (agent_transport, mut agent_peer) = channel::pair();
        let agent = Session::new(SessionId(1), Role::Agent, "Ada", agent_transport, 8);
        coordinator.register_agent(agent.handle()).await.unwrap();
        let _agent_tasks = agent.start(coordinator.clone());

        let (customer_transport, customer_peer) = channel::pair();
        let customer = Session::new(SessionId(2), Role::Customer, "Bob", customer_transport, 8);
        coordinator.register_customer(customer.handle()).await.unwrap();
        let _customer_tasks = customer.start(coordinator.clone());

        let joined = frame(&agent_peer.recv().await.unwrap());
        assert_eq!(joined.body, "Bob has joined the chat!");

        customer_peer.send("   ").await.unwrap();
        customer_peer.send(r#"{"body":"hi"}"#).await.unwrap();

        let routed = frame(&agent_peer.recv().await.unwrap());
        assert_eq!(routed.sender, "Bob");
        assert_eq!(routed.body, "hi");
        assert_eq!(
            coordinator.snapshot().await.unwrap().stats.messages_routed,
            1
        );
    }
}
