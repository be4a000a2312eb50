//! Runtime for executing sessions
//!
//! Owns the connection and the message logs, feeds every input through
//! `session::transition` one at a time, and carries out the resulting effects.

mod connection;
mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use connection::ConnectionHandle;
pub use executor::SessionRuntime;
pub use traits::*;

use crate::protocol::ConferenceEvent;
use crate::session::{Event, SessionSnapshot, TransitionError};
use serde::Serialize;
use tokio::sync::oneshot;

/// Outcome of a command, reported back to the caller that queued it
pub type Reply = oneshot::Sender<Result<(), TransitionError>>;

/// An input on the runtime's queue
#[derive(Debug)]
pub struct Inbound {
    pub event: Event,
    pub reply: Option<Reply>,
}

impl Inbound {
    /// Input whose transition outcome is sent back on the returned receiver
    pub fn with_reply(event: Event) -> (Self, oneshot::Receiver<Result<(), TransitionError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                event,
                reply: Some(tx),
            },
            rx,
        )
    }
}

impl From<Event> for Inbound {
    fn from(event: Event) -> Self {
        Self { event, reply: None }
    }
}

/// Notifications published to observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// An event was appended to a pattern's log
    Appended {
        pattern: String,
        event: ConferenceEvent,
    },
    StateChanged {
        snapshot: SessionSnapshot,
    },
    /// A log was emptied; `None` means every log
    Cleared {
        pattern: Option<String>,
    },
    Error {
        message: String,
    },
}
