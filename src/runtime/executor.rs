//! Session runtime executor

use super::connection::ConnectionHandle;
use super::traits::{MessageLog, Transport};
use super::{Inbound, SessionUpdate};

use crate::config::ClientConfig;
use crate::session::{
    transition, Effect, Event, SessionContext, SessionSnapshot, SessionState, TransitionError,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Generic session runtime that can work with any transport and log implementations
pub struct SessionRuntime<T, L>
where
    T: Transport + ?Sized + 'static,
    L: MessageLog + ?Sized + 'static,
{
    context: SessionContext,
    state: SessionState,
    config: ClientConfig,
    transport: Arc<T>,
    log: Arc<L>,
    /// The single live connection, if any
    connection: Option<ConnectionHandle>,
    inbox_rx: mpsc::Receiver<Inbound>,
    inbox_tx: mpsc::Sender<Inbound>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<T, L> SessionRuntime<T, L>
where
    T: Transport + ?Sized + 'static,
    L: MessageLog + ?Sized + 'static,
{
    pub fn new(context: SessionContext, config: ClientConfig, transport: Arc<T>, log: Arc<L>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (updates_tx, _) = broadcast::channel(config.update_capacity.max(1));
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Self {
            context,
            state: SessionState::default(),
            config,
            transport,
            log,
            connection: None,
            inbox_rx,
            inbox_tx,
            updates_tx,
            snapshot_tx,
        }
    }

    /// Sender for commands and connection callbacks
    pub fn inbox(&self) -> mpsc::Sender<Inbound> {
        self.inbox_tx.clone()
    }

    pub fn updates(&self) -> broadcast::Sender<SessionUpdate> {
        self.updates_tx.clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Process inputs until `shutdown` fires, then close the connection
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(client_id = %self.context.client_id, "Starting session runtime");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                Some(inbound) = self.inbox_rx.recv() => self.handle(inbound),
                else => break,
            }
        }

        self.handle(Event::Shutdown.into());
        self.connection = None;

        tracing::info!(client_id = %self.context.client_id, "Session runtime stopped");
    }

    fn handle(&mut self, inbound: Inbound) {
        let Inbound { event, reply } = inbound;
        let result = self.process_event(event);

        if let Err(e) = &result {
            match e {
                TransitionError::StaleEpoch { epoch } => {
                    tracing::debug!(epoch, "Dropping input from superseded connection");
                }
                TransitionError::MalformedEvent(detail) => {
                    tracing::warn!(error = %detail, "Discarding malformed event");
                }
                TransitionError::NotConnected => {
                    tracing::warn!("Decision submitted without an open connection");
                    let _ = self.updates_tx.send(SessionUpdate::Error {
                        message: e.to_string(),
                    });
                }
                TransitionError::InvalidTransition(detail) => {
                    tracing::debug!(detail = %detail, "Ignoring out-of-order callback");
                }
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        tracing::debug!(event = ?event, state = self.state.connection.name(), "Processing input");

        // Pure state transition
        let result = transition(&self.state, &self.context, event)?;
        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect);
        }

        // A connection that finished on its own is no longer live
        if self
            .connection
            .as_ref()
            .is_some_and(|conn| self.state.connection.live_epoch() != Some(conn.epoch()))
        {
            self.connection = None;
        }

        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::OpenConnection { epoch, protocol } => {
                let url = self.config.endpoint_for(protocol);
                tracing::info!(epoch, protocol = ?protocol, endpoint = %url, "Opening connection");
                self.connection = Some(ConnectionHandle::spawn(
                    self.transport.clone(),
                    url,
                    epoch,
                    self.inbox_tx.clone(),
                ));
            }

            Effect::CloseConnection { epoch } => {
                if let Some(conn) = self.connection.take_if(|conn| conn.epoch() == epoch) {
                    // Fire-and-forget: the pump reports closure as a stale callback
                    conn.close();
                }
            }

            Effect::Send { epoch, message } => {
                let Some(conn) = self.connection.as_ref().filter(|c| c.epoch() == epoch) else {
                    tracing::warn!(epoch, "No connection for outbound message");
                    return;
                };
                match message.to_json() {
                    Ok(text) => {
                        if let Err(e) = conn.send(text) {
                            tracing::warn!(epoch, error = %e, "Failed to queue outbound message");
                        }
                    }
                    Err(e) => tracing::error!(epoch, error = %e, "Failed to serialize outbound message"),
                }
            }

            Effect::AppendEvent { pattern, event } => {
                tracing::debug!(pattern = %pattern, kind = event.kind(), "Appending event");
                self.log.append(&pattern, event.clone());
                let _ = self.updates_tx.send(SessionUpdate::Appended { pattern, event });
            }

            Effect::ClearLog { pattern } => {
                self.log.clear(&pattern);
                let _ = self.updates_tx.send(SessionUpdate::Cleared {
                    pattern: Some(pattern),
                });
            }

            Effect::ClearAllLogs => {
                self.log.clear_all();
                let _ = self.updates_tx.send(SessionUpdate::Cleared { pattern: None });
            }

            Effect::NotifyStateChange => {
                let snapshot = self.state.snapshot();
                self.snapshot_tx.send_replace(snapshot.clone());
                let _ = self.updates_tx.send(SessionUpdate::StateChanged { snapshot });
            }
        }
    }
}
