//! Inputs that drive the session state machine

use super::state::Epoch;
use crate::protocol::{HitlDecision, SessionConfig};

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Caller commands
    Start {
        config: SessionConfig,
    },
    SubmitDecision {
        decision: HitlDecision,
    },
    ClearMessages {
        pattern: String,
    },
    ClearAllMessages,
    Shutdown,

    // Connection callbacks, tagged with the epoch of the connection they came from
    ConnectionOpened {
        epoch: Epoch,
    },
    FrameReceived {
        epoch: Epoch,
        text: String,
    },
    TransportFailed {
        epoch: Epoch,
        description: String,
    },
    ConnectionClosed {
        epoch: Epoch,
    },
}

impl Event {
    /// Epoch of the connection a callback belongs to; `None` for commands
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            Event::ConnectionOpened { epoch }
            | Event::FrameReceived { epoch, .. }
            | Event::TransportFailed { epoch, .. }
            | Event::ConnectionClosed { epoch } => Some(*epoch),
            Event::Start { .. }
            | Event::SubmitDecision { .. }
            | Event::ClearMessages { .. }
            | Event::ClearAllMessages
            | Event::Shutdown => None,
        }
    }
}
