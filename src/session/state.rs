//! Session state types

use crate::protocol::{SessionConfig, DEFAULT_MAX_REVISIONS, HITL_PATTERN};
use serde::Serialize;

/// Monotonic tag identifying one connection attempt
pub type Epoch = u64;

/// Which server sub-protocol a session speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Standard,
    Hitl,
}

impl Protocol {
    pub fn for_pattern(pattern: &str) -> Self {
        if pattern == HITL_PATTERN {
            Protocol::Hitl
        } else {
            Protocol::Standard
        }
    }

    /// Log key events of this protocol are appended under
    pub fn log_key(self, pattern: &str) -> &str {
        match self {
            Protocol::Hitl => HITL_PATTERN,
            Protocol::Standard => pattern,
        }
    }
}

/// Lifecycle of the (single) connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting {
        epoch: Epoch,
    },
    Open {
        epoch: Epoch,
    },
    Closed {
        epoch: Epoch,
    },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open { .. })
    }

    /// Epoch of a connection that is still live (connecting or open)
    pub fn live_epoch(&self) -> Option<Epoch> {
        match self {
            ConnectionState::Connecting { epoch } | ConnectionState::Open { epoch } => Some(*epoch),
            ConnectionState::Idle | ConnectionState::Closed { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Open { .. } => "open",
            ConnectionState::Closed { .. } => "closed",
        }
    }
}

/// Human-in-the-loop sub-state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitlState {
    pub session_id: Option<String>,
    pub awaiting_input: bool,
    pub proposal: String,
    pub revision_count: u32,
    pub max_revisions: u32,
}

impl HitlState {
    pub fn new(max_revisions: u32) -> Self {
        Self {
            session_id: None,
            awaiting_input: false,
            proposal: String::new(),
            revision_count: 0,
            max_revisions,
        }
    }

    /// Forget the current session, keeping the revision bound
    pub fn reset(&mut self) {
        *self = Self::new(self.max_revisions);
    }
}

impl Default for HitlState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REVISIONS)
    }
}

/// Orthogonal HITL state, derived from connection and [`HitlState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlPhase {
    #[default]
    Inactive,
    AwaitingProposal,
    AwaitingDecision,
}

/// The session bound to the current connection epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub epoch: Epoch,
    pub protocol: Protocol,
    /// Log key events of this session are appended under
    pub log_key: String,
    pub config: SessionConfig,
}

/// Immutable context for a client
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub client_id: String,
    pub default_max_revisions: u32,
}

impl SessionContext {
    pub fn new(client_id: impl Into<String>, default_max_revisions: u32) -> Self {
        Self {
            client_id: client_id.into(),
            default_max_revisions,
        }
    }
}

/// Complete session state (message logs live in the runtime's log store)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub running: bool,
    pub current_pattern: Option<String>,
    pub active: Option<ActiveSession>,
    /// Last epoch handed out
    pub last_epoch: Epoch,
    pub hitl: HitlState,
}

impl SessionState {
    pub fn connected(&self) -> bool {
        self.connection.is_open()
    }

    pub fn active_protocol(&self) -> Option<Protocol> {
        self.active.as_ref().map(|a| a.protocol)
    }

    pub fn is_hitl(&self) -> bool {
        self.active_protocol() == Some(Protocol::Hitl)
    }

    /// Whether `epoch` belongs to the session currently bound
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.active.as_ref().is_some_and(|a| a.epoch == epoch)
    }

    pub fn hitl_phase(&self) -> HitlPhase {
        if !self.is_hitl() || !self.connected() {
            HitlPhase::Inactive
        } else if self.hitl.awaiting_input {
            HitlPhase::AwaitingDecision
        } else {
            HitlPhase::AwaitingProposal
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection,
            connected: self.connected(),
            running: self.running,
            current_pattern: self.current_pattern.clone(),
            hitl: self.hitl.clone(),
            hitl_phase: self.hitl_phase(),
        }
    }
}

/// Read-only view published to callers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub connected: bool,
    pub running: bool,
    pub current_pattern: Option<String>,
    pub hitl: HitlState,
    pub hitl_phase: HitlPhase,
}
