//! Pure state transition function
//!
//! Given the same state, context and event, `transition` always produces the
//! same new state and effects; it performs no I/O.

use super::state::{ActiveSession, ConnectionState, Epoch, HitlState, Protocol};
use super::{Effect, Event, SessionContext, SessionState};
use crate::protocol::{
    ConferenceEvent, HitlDecision, HitlRequest, OutboundMessage, SessionConfig, HITL_PATTERN,
};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Append `NotifyStateChange` if the observable snapshot differs from `before`
    fn notify_if_changed(self, before: &SessionState) -> Self {
        if self.new_state.snapshot() == before.snapshot() {
            self
        } else {
            self.with_effect(Effect::NotifyStateChange)
        }
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("No open connection to the conference server")]
    NotConnected,
    #[error("Ignoring event from superseded connection (epoch {epoch})")]
    StaleEpoch { epoch: Epoch },
    #[error("Discarding malformed event: {0}")]
    MalformedEvent(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if let Some(epoch) = event.epoch() {
        if !state.is_current(epoch) {
            return Err(TransitionError::StaleEpoch { epoch });
        }
    }

    let result = match event {
        Event::Start { config } => start(state, context, config),
        Event::ConnectionOpened { epoch } => {
            if state.connection != (ConnectionState::Connecting { epoch }) {
                return Err(TransitionError::InvalidTransition(format!(
                    "open callback while {}",
                    state.connection.name()
                )));
            }
            opened(state, epoch)
        }
        Event::FrameReceived { epoch, text } => {
            if state.connection != (ConnectionState::Open { epoch }) {
                return Err(TransitionError::InvalidTransition(format!(
                    "frame received while {}",
                    state.connection.name()
                )));
            }
            received(state, &text)?
        }
        Event::TransportFailed { description, .. } => transport_failed(state, &description),
        Event::ConnectionClosed { epoch } => closed(state, epoch),
        Event::SubmitDecision { decision } => submit_decision(state, decision)?,
        Event::ClearMessages { pattern } => clear_messages(state, pattern),
        Event::ClearAllMessages => clear_all(state),
        Event::Shutdown => shutdown(state),
    };

    Ok(result.notify_if_changed(state))
}

// ============================================================
// Connection lifecycle
// ============================================================

/// Any state + Start -> Connecting on a fresh epoch, superseding a live connection
fn start(state: &SessionState, context: &SessionContext, config: SessionConfig) -> TransitionResult {
    let protocol = Protocol::for_pattern(&config.pattern);
    let epoch = state.last_epoch + 1;
    let log_key = protocol.log_key(&config.pattern).to_string();

    let mut next = state.clone();
    next.last_epoch = epoch;
    next.connection = ConnectionState::Connecting { epoch };
    next.running = false;
    next.current_pattern = Some(log_key.clone());

    // The superseded connection's close arrives on a stale epoch, so clear here
    if state.is_hitl() && state.connection.live_epoch().is_some() {
        next.hitl.awaiting_input = false;
    }

    if protocol == Protocol::Hitl {
        // Zero means "unset" on the wire, same as absent
        let max_revisions = config
            .max_revisions
            .filter(|n| *n > 0)
            .unwrap_or(context.default_max_revisions);
        next.hitl = HitlState::new(max_revisions);
    }

    next.active = Some(ActiveSession {
        epoch,
        protocol,
        log_key,
        config,
    });

    let close = state
        .connection
        .live_epoch()
        .map(|old| Effect::CloseConnection { epoch: old });

    TransitionResult::new(next)
        .with_effects(close)
        .with_effect(Effect::OpenConnection { epoch, protocol })
}

/// Connecting + ConnectionOpened -> Open, send the session-initiation payload
fn opened(state: &SessionState, epoch: Epoch) -> TransitionResult {
    let mut next = state.clone();
    next.connection = ConnectionState::Open { epoch };
    next.running = true;

    let initial = next.active.as_ref().map(|active| match active.protocol {
        Protocol::Standard => OutboundMessage::Config(active.config.clone()),
        Protocol::Hitl => OutboundMessage::Hitl(HitlRequest::Start {
            topic: active.config.topic.clone(),
            max_revisions: next.hitl.max_revisions,
        }),
    });

    TransitionResult::new(next).with_effects(initial.map(|message| Effect::send(epoch, message)))
}

/// Open + FrameReceived -> append to the active log, then apply kind-specific updates
fn received(state: &SessionState, text: &str) -> Result<TransitionResult, TransitionError> {
    let event =
        ConferenceEvent::parse(text).map_err(|e| TransitionError::MalformedEvent(e.to_string()))?;

    let mut next = state.clone();
    let is_hitl = next.is_hitl();

    if is_hitl {
        apply_hitl_event(&mut next.hitl, &event);
    }

    if event.is_terminal() {
        next.running = false;
        if is_hitl {
            next.hitl.awaiting_input = false;
        }
    }

    let log_key = active_log_key(state);
    Ok(TransitionResult::new(next).with_effect(Effect::append(log_key, event)))
}

fn apply_hitl_event(hitl: &mut HitlState, event: &ConferenceEvent) {
    match event {
        ConferenceEvent::HitlSessionStart {
            session_id,
            max_revisions,
            ..
        } => {
            hitl.session_id = session_id.clone();
            hitl.max_revisions = max_revisions.unwrap_or(hitl.max_revisions);
        }
        ConferenceEvent::HitlAwaitingInput {
            proposal,
            revision_count,
            max_revisions,
            ..
        } => {
            hitl.awaiting_input = true;
            hitl.proposal = proposal.clone().unwrap_or_default();
            hitl.revision_count = revision_count.unwrap_or(0);
            hitl.max_revisions = max_revisions.unwrap_or(hitl.max_revisions);
        }
        ConferenceEvent::HitlUserDecision { .. }
        | ConferenceEvent::ConferenceComplete { .. }
        | ConferenceEvent::Error { .. }
        | ConferenceEvent::Progress { .. } => {}
    }
}

/// Live + TransportFailed -> not running, synthetic error in the active log
fn transport_failed(state: &SessionState, description: &str) -> TransitionResult {
    let mut next = state.clone();
    next.running = false;

    let label = if next.is_hitl() {
        next.hitl.awaiting_input = false;
        "HITL WebSocket"
    } else {
        "WebSocket"
    };

    let error = ConferenceEvent::transport_error(format!("{label} connection error: {description}"));
    TransitionResult::new(next).with_effect(Effect::append(active_log_key(state), error))
}

/// Live + ConnectionClosed -> Closed
fn closed(state: &SessionState, epoch: Epoch) -> TransitionResult {
    let mut next = state.clone();
    next.connection = ConnectionState::Closed { epoch };
    next.running = false;
    if next.is_hitl() {
        next.hitl.awaiting_input = false;
    }
    TransitionResult::new(next)
}

fn active_log_key(state: &SessionState) -> String {
    state
        .active
        .as_ref()
        .map(|active| active.log_key.clone())
        .unwrap_or_default()
}

// ============================================================
// Caller commands
// ============================================================

/// Open + SubmitDecision -> record the decision locally and send it
fn submit_decision(
    state: &SessionState,
    decision: HitlDecision,
) -> Result<TransitionResult, TransitionError> {
    let ConnectionState::Open { epoch } = state.connection else {
        return Err(TransitionError::NotConnected);
    };

    let mut next = state.clone();
    next.hitl.awaiting_input = false;

    let record = ConferenceEvent::user_decision(&decision);
    let request = HitlRequest::Decision {
        session_id: state.hitl.session_id.clone(),
        decision: decision.decision,
        feedback: decision.feedback,
    };

    Ok(TransitionResult::new(next)
        .with_effect(Effect::append(HITL_PATTERN, record))
        .with_effect(Effect::send(epoch, OutboundMessage::Hitl(request))))
}

/// Clearing never touches the connection
fn clear_messages(state: &SessionState, pattern: String) -> TransitionResult {
    let mut next = state.clone();
    if pattern == HITL_PATTERN {
        next.hitl.reset();
    }
    TransitionResult::new(next).with_effect(Effect::ClearLog { pattern })
}

fn clear_all(state: &SessionState) -> TransitionResult {
    let mut next = state.clone();
    next.hitl.reset();
    TransitionResult::new(next).with_effect(Effect::ClearAllLogs)
}

/// Teardown: close whatever is live
fn shutdown(state: &SessionState) -> TransitionResult {
    let mut next = state.clone();
    let live = state.connection.live_epoch();
    if let Some(epoch) = live {
        next.connection = ConnectionState::Closed { epoch };
    }
    next.running = false;
    next.hitl.awaiting_input = false;

    TransitionResult::new(next).with_effects(live.map(|epoch| Effect::CloseConnection { epoch }))
}
