//! Effects produced by state transitions

use super::state::{Epoch, Protocol};
use crate::protocol::{ConferenceEvent, OutboundMessage};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a connection to the endpoint serving `protocol`
    OpenConnection { epoch: Epoch, protocol: Protocol },

    /// Request closure of a connection; not awaited
    CloseConnection { epoch: Epoch },

    /// Write a message to the connection with this epoch
    Send {
        epoch: Epoch,
        message: OutboundMessage,
    },

    /// Append an event to a pattern's message log
    AppendEvent {
        pattern: String,
        event: ConferenceEvent,
    },

    /// Empty one pattern's log
    ClearLog { pattern: String },

    /// Empty every log
    ClearAllLogs,

    /// Publish the new snapshot to observers
    NotifyStateChange,
}

impl Effect {
    pub fn append(pattern: impl Into<String>, event: ConferenceEvent) -> Self {
        Effect::AppendEvent {
            pattern: pattern.into(),
            event,
        }
    }

    pub fn send(epoch: Epoch, message: OutboundMessage) -> Self {
        Effect::Send { epoch, message }
    }
}
