//! Public handle to a conference session
//!
//! `ConferenceClient` owns a spawned [`SessionRuntime`] and talks to it only
//! through its inbound queue. Reads (logs, snapshot) never go through the
//! queue: logs are read from the shared store and the snapshot from a watch
//! channel.

use crate::config::ClientConfig;
use crate::protocol::{ConferenceEvent, HitlDecision, SessionConfig};
use crate::runtime::{
    InMemoryLog, Inbound, MessageLog, SessionRuntime, SessionUpdate, Transport, WsTransport,
};
use crate::session::{Event, HitlState, SessionContext, SessionSnapshot, TransitionError};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Session runtime has stopped")]
    RuntimeStopped,
    #[error("No open connection to the conference server")]
    NotConnected,
    #[error("Command rejected: {0}")]
    Rejected(TransitionError),
}

impl From<TransitionError> for ClientError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotConnected => ClientError::NotConnected,
            other => ClientError::Rejected(other),
        }
    }
}

/// Handle to one conference session client
///
/// Dropping the handle closes any open connection without waiting;
/// [`ConferenceClient::shutdown`] also waits for the runtime to finish.
pub struct ConferenceClient {
    inbox: mpsc::Sender<Inbound>,
    log: Arc<dyn MessageLog>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
    _shutdown: DropGuard,
}

impl ConferenceClient {
    /// Client speaking WebSocket to the configured server
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_parts(config, Arc::new(WsTransport), Arc::new(InMemoryLog::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_parts(config, transport, Arc::new(InMemoryLog::new()))
    }

    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        log: Arc<dyn MessageLog>,
    ) -> Self {
        let client_id = uuid::Uuid::new_v4().to_string();
        let context = SessionContext::new(&client_id, config.default_max_revisions);
        tracing::debug!(client_id = %client_id, endpoint = %config.ws_url, "Creating conference client");

        let runtime = SessionRuntime::new(context, config, transport, log.clone());
        let inbox = runtime.inbox();
        let updates = runtime.updates();
        let snapshots = runtime.snapshots();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(runtime.run(shutdown.clone()));

        Self {
            inbox,
            log,
            updates,
            snapshots,
            task: Some(task),
            _shutdown: shutdown.drop_guard(),
        }
    }

    async fn send(&self, event: Event) -> Result<(), ClientError> {
        self.inbox
            .send(event.into())
            .await
            .map_err(|_| ClientError::RuntimeStopped)
    }

    /// Queue `event` and wait until the runtime has applied it
    async fn request(&self, event: Event) -> Result<(), ClientError> {
        let (inbound, reply) = Inbound::with_reply(event);
        self.inbox
            .send(inbound)
            .await
            .map_err(|_| ClientError::RuntimeStopped)?;
        reply.await.map_err(|_| ClientError::RuntimeStopped)??;
        Ok(())
    }

    /// Start a session, superseding any current one
    ///
    /// Returns once the command is queued; progress arrives through
    /// [`ConferenceClient::updates`] and the logs.
    pub async fn start(&self, config: SessionConfig) -> Result<(), ClientError> {
        tracing::info!(pattern = %config.pattern, "Starting conference session");
        self.send(Event::Start { config }).await
    }

    /// Send the human's decision on the current proposal
    ///
    /// Fails with [`ClientError::NotConnected`] when no connection is open,
    /// in which case nothing is recorded or sent.
    pub async fn submit_decision(&self, decision: HitlDecision) -> Result<(), ClientError> {
        self.request(Event::SubmitDecision { decision }).await
    }

    /// Snapshot of a pattern's log, empty if nothing was received for it
    pub fn messages(&self, pattern: &str) -> Vec<ConferenceEvent> {
        self.log.messages(pattern)
    }

    /// Patterns that currently have a log
    pub fn patterns(&self) -> Vec<String> {
        self.log.patterns()
    }

    /// Empty one log; clearing `"hitl"` also resets the HITL session state
    ///
    /// The log is empty by the time this returns.
    pub async fn clear_messages(&self, pattern: impl Into<String>) -> Result<(), ClientError> {
        self.request(Event::ClearMessages {
            pattern: pattern.into(),
        })
        .await
    }

    pub async fn clear_all_messages(&self) -> Result<(), ClientError> {
        self.request(Event::ClearAllMessages).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshots.borrow().connected
    }

    pub fn is_running(&self) -> bool {
        self.snapshots.borrow().running
    }

    pub fn current_pattern(&self) -> Option<String> {
        self.snapshots.borrow().current_pattern.clone()
    }

    pub fn hitl(&self) -> HitlState {
        self.snapshots.borrow().hitl.clone()
    }

    /// Raw broadcast receiver; lagging receivers see `RecvError::Lagged`
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Stream of updates; updates missed by a lagging consumer are skipped
    pub fn updates(&self) -> impl Stream<Item = SessionUpdate> + Send + 'static {
        BroadcastStream::new(self.updates.subscribe()).filter_map(|update| async move {
            match update {
                Ok(update) => Some(update),
                Err(e) => {
                    tracing::warn!(error = %e, "Update consumer lagged");
                    None
                }
            }
        })
    }

    /// Watch receiver that changes whenever the snapshot does
    pub fn watch_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Close the connection and wait for the runtime to finish
    pub async fn shutdown(mut self) {
        let task = self.task.take();
        // Dropping the guard cancels the runtime loop
        drop(self);
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Session runtime panicked");
            }
        }
    }
}
