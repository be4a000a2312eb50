//! Wire format spoken with the conference server
//!
//! Inbound traffic is a stream of [`ConferenceEvent`] JSON records; outbound
//! traffic is either the session configuration (standard patterns) or a
//! [`HitlRequest`] (human-in-the-loop pattern).

mod event;
mod request;

pub use event::{ConferenceEvent, EventFields, FileDescriptor, ParallelInfo};
pub use request::{Decision, HitlDecision, HitlRequest, OutboundMessage, SessionConfig};

/// Pattern name that selects the human-in-the-loop sub-protocol
pub const HITL_PATTERN: &str = "hitl";

/// Bound on proposal revisions when neither the caller nor the server supplies one
pub const DEFAULT_MAX_REVISIONS: u32 = 3;
