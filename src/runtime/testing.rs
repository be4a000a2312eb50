//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{Inbound, SessionRuntime, SessionUpdate};
use crate::config::ClientConfig;
use crate::protocol::{ConferenceEvent, HitlDecision, SessionConfig};
use crate::session::{Event, SessionContext, SessionSnapshot, TransitionError};
use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Mock Transport
// ============================================================================

/// Server side of one accepted mock connection
pub struct MockPeer {
    pub url: String,
    /// Frames the client wrote
    received: frames::UnboundedReceiver<String>,
    /// Frames for the client; dropping it hangs up
    push: Option<frames::UnboundedSender<Result<String, TransportError>>>,
}

#[allow(dead_code)]
impl MockPeer {
    /// Send a JSON payload to the client
    pub fn push(&self, payload: &Value) {
        self.push_raw(&payload.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(push) = &self.push {
            let _ = push.unbounded_send(Ok(text.to_string()));
        }
    }

    /// Fail the connection with a transport error
    pub fn fail(&self, description: &str) {
        if let Some(push) = &self.push {
            let _ = push.unbounded_send(Err(TransportError::Protocol(description.to_string())));
        }
    }

    /// Close the connection from the server side
    pub fn hang_up(&mut self) {
        self.push = None;
    }

    /// Next frame the client wrote, parsed as JSON
    pub async fn recv_json(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.received.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the connection");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Whether the client closes its side within the timeout
    pub async fn closed_by_client(&mut self) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            match tokio::time::timeout_at(deadline, self.received.next()).await {
                Ok(Some(_)) => {}
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// In-process transport; each successful connect hands a [`MockPeer`] to the test
pub struct MockTransport {
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
    refusal: Mutex<Option<String>>,
    /// URLs of every connection attempt
    urls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            peers_tx,
            peers_rx: tokio::sync::Mutex::new(peers_rx),
            refusal: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent connects fail
    pub fn refuse_with(&self, reason: &str) {
        *self.refusal.lock().unwrap() = Some(reason.to_string());
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Wait for the next accepted connection
    pub async fn accept(&self) -> MockPeer {
        let mut peers = self.peers_rx.lock().await;
        tokio::time::timeout(WAIT, peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str) -> Result<Duplex, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());

        if let Some(reason) = self.refusal.lock().unwrap().clone() {
            return Err(TransportError::Unavailable(reason));
        }

        let (client_tx, received) = frames::unbounded::<String>();
        let (push, client_rx) = frames::unbounded::<Result<String, TransportError>>();

        let _ = self.peers_tx.send(MockPeer {
            url: url.to_string(),
            received,
            push: Some(push),
        });

        Ok(Duplex {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: client_rx.boxed(),
        })
    }
}

// ============================================================================
// Test Runtime Harness
// ============================================================================

/// A spawned runtime wired to a mock transport and an in-memory log
pub struct TestRuntime {
    pub transport: Arc<MockTransport>,
    pub log: Arc<InMemoryLog>,
    pub inbox: mpsc::Sender<Inbound>,
    pub updates: broadcast::Receiver<SessionUpdate>,
    pub snapshots: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl TestRuntime {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let transport = Arc::new(MockTransport::new());
        let log = Arc::new(InMemoryLog::new());
        let context = SessionContext::new("test-client", config.default_max_revisions);

        let runtime = SessionRuntime::new(context, config, transport.clone(), log.clone());
        let inbox = runtime.inbox();
        let updates = runtime.updates().subscribe();
        let snapshots = runtime.snapshots();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runtime.run(shutdown.clone()));

        Self {
            transport,
            log,
            inbox,
            updates,
            snapshots,
            shutdown,
            handle,
        }
    }

    pub async fn send(&self, event: Event) {
        self.inbox
            .send(event.into())
            .await
            .expect("runtime stopped");
    }

    pub async fn start(&self, pattern: &str, topic: &str) {
        self.send(Event::Start {
            config: SessionConfig::new(pattern, topic),
        })
        .await;
    }

    pub async fn submit(&self, decision: HitlDecision) -> Result<(), TransitionError> {
        let (inbound, reply) = Inbound::with_reply(Event::SubmitDecision { decision });
        self.inbox.send(inbound).await.expect("runtime stopped");
        reply.await.expect("runtime dropped the reply")
    }

    /// Wait until the published snapshot satisfies `pred`
    pub async fn wait_for(&mut self, pred: impl FnMut(&SessionSnapshot) -> bool) -> bool {
        matches!(
            tokio::time::timeout(WAIT, self.snapshots.wait_for(pred)).await,
            Ok(Ok(_))
        )
    }

    /// Wait until `pattern`'s log holds at least `count` events
    pub async fn wait_for_messages(&self, pattern: &str, count: usize) -> bool {
        self.wait_for_log(pattern, |events| events.len() >= count)
            .await
    }

    /// Poll `pattern`'s log until `pred` holds
    pub async fn wait_for_log(
        &self,
        pattern: &str,
        pred: impl Fn(&[ConferenceEvent]) -> bool,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if pred(&self.log.messages(pattern)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Start a session and accept its connection, consuming the initiation frame
    pub async fn open(&mut self, pattern: &str, topic: &str) -> (MockPeer, Value) {
        self.start(pattern, topic).await;
        let mut peer = self.transport.accept().await;
        let initial = peer.recv_json().await;
        assert!(self.wait_for(|s| s.connected && s.running).await);
        (peer, initial)
    }

    /// Stop the runtime and wait for it to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("runtime did not stop")
            .expect("runtime panicked");
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Decision;
    use crate::session::HitlPhase;
    use serde_json::json;

    fn kinds(events: &[ConferenceEvent]) -> Vec<&str> {
        events.iter().map(ConferenceEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_standard_session_streams_into_its_log() {
        let mut rt = TestRuntime::new();
        let (peer, initial) = rt.open("brainstorm", "X").await;

        assert!(peer.url.ends_with("/api/ws/conference"));
        assert_eq!(initial, json!({"pattern": "brainstorm", "topic": "X"}));

        let turn = json!({"type": "agent_turn", "node": "A", "content": "hello"});
        peer.push(&turn);
        assert!(rt.wait_for_messages("brainstorm", 1).await);

        let messages = rt.log.messages("brainstorm");
        assert_eq!(messages.len(), 1);
        assert_eq!(serde_json::to_value(&messages[0]).unwrap(), turn);
        assert!(rt.snapshots.borrow().running);

        peer.push(&json!({"type": "conference_complete", "status": "complete"}));
        assert!(rt.wait_for(|s| !s.running).await);
        assert_eq!(
            kinds(&rt.log.messages("brainstorm")),
            ["agent_turn", "conference_complete"]
        );

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_hitl_routes_to_hitl_endpoint() {
        let mut rt = TestRuntime::new();
        let (peer, initial) = rt.open("hitl", "Launch plan").await;

        assert!(peer.url.ends_with("/api/ws/hitl"));
        assert_eq!(
            initial,
            json!({"action": "start", "topic": "Launch plan", "max_revisions": 3})
        );
        assert_eq!(rt.transport.urls().len(), 1);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_hitl_decision_round_trip() {
        let mut rt = TestRuntime::new();
        let (mut peer, _) = rt.open("hitl", "Launch plan").await;

        peer.push(&json!({"type": "hitl_session_start", "session_id": "s-1"}));
        peer.push(&json!({
            "type": "hitl_awaiting_input",
            "proposal": "Ship in May",
            "revision_count": 1,
            "max_revisions": 4
        }));
        assert!(
            rt.wait_for(|s| s.hitl_phase == HitlPhase::AwaitingDecision)
                .await
        );
        {
            let snapshot = rt.snapshots.borrow();
            assert_eq!(snapshot.hitl.session_id.as_deref(), Some("s-1"));
            assert_eq!(snapshot.hitl.proposal, "Ship in May");
            assert_eq!(snapshot.hitl.revision_count, 1);
            assert_eq!(snapshot.hitl.max_revisions, 4);
        }

        rt.submit(HitlDecision::new(Decision::Revision, "Move to June"))
            .await
            .unwrap();

        assert_eq!(
            peer.recv_json().await,
            json!({"action": "decision", "session_id": "s-1", "decision": "revision", "feedback": "Move to June"})
        );
        assert_eq!(
            kinds(&rt.log.messages("hitl")),
            ["hitl_session_start", "hitl_awaiting_input", "hitl_user_decision"]
        );
        assert!(rt.wait_for(|s| !s.hitl.awaiting_input).await);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_decision_without_connection_is_rejected() {
        let rt = TestRuntime::new();

        let result = rt
            .submit(HitlDecision::new(Decision::Approve, ""))
            .await;

        assert!(matches!(result, Err(TransitionError::NotConnected)));
        assert!(rt.log.messages("hitl").is_empty());
        assert!(rt.transport.urls().is_empty());

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_start_supersedes_previous_connection() {
        let mut rt = TestRuntime::new();
        let (mut first, _) = rt.open("debate", "A").await;

        rt.start("brainstorm", "B").await;
        // Trailing traffic on the superseded connection
        first.push(&json!({"type": "agent_turn", "content": "late"}));

        let second = rt.transport.accept().await;
        assert!(first.closed_by_client().await);

        second.push(&json!({"type": "agent_turn", "content": "fresh"}));
        assert!(rt.wait_for_messages("brainstorm", 1).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(rt.log.messages("debate").is_empty());
        assert_eq!(rt.log.messages("brainstorm").len(), 1);
        assert_eq!(
            rt.snapshots.borrow().current_pattern.as_deref(),
            Some("brainstorm")
        );

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_transport_error_appends_synthetic_event() {
        let mut rt = TestRuntime::new();
        let (peer, _) = rt.open("debate", "A").await;

        peer.fail("connection reset by peer");
        assert!(rt.wait_for(|s| !s.running && !s.connected).await);

        let messages = rt.log.messages("debate");
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ConferenceEvent::Error { error, fields } => {
                assert!(error
                    .as_deref()
                    .is_some_and(|e| e.contains("connection reset by peer")));
                assert_eq!(fields.status.as_deref(), Some("error"));
            }
            other => panic!("Expected error event, got {other:?}"),
        }

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        let mut rt = TestRuntime::new();
        rt.transport.refuse_with("connection refused");

        rt.start("hitl", "T").await;
        assert!(rt.wait_for_messages("hitl", 1).await);

        let messages = rt.log.messages("hitl");
        assert_eq!(kinds(&messages), ["error"]);
        assert!(rt
            .wait_for(|s| matches!(s.connection, crate::session::ConnectionState::Closed { .. }))
            .await);
        assert!(!rt.snapshots.borrow().running);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_frames_are_discarded() {
        let mut rt = TestRuntime::new();
        let (peer, _) = rt.open("debate", "A").await;

        peer.push_raw("not json");
        peer.push(&json!({"content": "no type"}));
        peer.push(&json!({"type": "agent_turn", "content": "ok"}));

        assert!(rt.wait_for_messages("debate", 1).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(kinds(&rt.log.messages("debate")), ["agent_turn"]);
        assert!(rt.snapshots.borrow().running);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_loosely_shaped_events_are_kept() {
        let mut rt = TestRuntime::new();
        let (peer, _) = rt.open("hitl", "T").await;

        peer.push(&json!({"type": "hitl_session_start"}));
        peer.push(&json!({"type": "agent_turn", "content": "hi", "file": "report.md"}));
        peer.push(&json!({"type": "agent_turn", "parallel_index": -1}));

        assert!(rt.wait_for_messages("hitl", 3).await);
        assert_eq!(
            kinds(&rt.log.messages("hitl")),
            ["hitl_session_start", "agent_turn", "agent_turn"]
        );
        assert!(rt.snapshots.borrow().running);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_server_close_ends_session() {
        let mut rt = TestRuntime::new();
        let (mut peer, _) = rt.open("debate", "A").await;

        peer.hang_up();
        assert!(rt.wait_for(|s| !s.connected && !s.running).await);
        assert!(rt.log.messages("debate").is_empty());

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_clear_keeps_connection_open() {
        let mut rt = TestRuntime::new();
        let (peer, _) = rt.open("debate", "A").await;

        peer.push(&json!({"type": "agent_turn", "content": "first"}));
        assert!(rt.wait_for_messages("debate", 1).await);

        rt.send(Event::ClearMessages {
            pattern: "debate".to_string(),
        })
        .await;
        peer.push(&json!({"type": "agent_turn", "content": "second"}));

        assert!(
            rt.wait_for_log("debate", |events| events
                .first()
                .is_some_and(|e| e.content() == Some("second")))
                .await
        );
        assert_eq!(rt.log.messages("debate").len(), 1);
        assert!(rt.snapshots.borrow().connected);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_connection() {
        let mut rt = TestRuntime::new();
        let (mut peer, _) = rt.open("debate", "A").await;

        rt.stop().await;
        assert!(peer.closed_by_client().await);
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let mut rt = TestRuntime::new();
        let (peer, _) = rt.open("debate", "A").await;

        peer.push(&json!({"type": "agent_turn", "content": "hi"}));
        assert!(rt.wait_for_messages("debate", 1).await);

        let mut appended = None;
        while let Ok(update) = rt.updates.try_recv() {
            if let SessionUpdate::Appended { pattern, event } = update {
                appended = Some((pattern, event));
            }
        }
        let (pattern, event) = appended.expect("no Appended update");
        assert_eq!(pattern, "debate");
        assert_eq!(event.content(), Some("hi"));

        rt.stop().await;
    }
}
