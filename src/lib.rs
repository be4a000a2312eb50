//! Conference session client
//!
//! Connects to an AI conference server, streams the events of a multi-agent
//! conversation into per-pattern message logs, and drives the
//! human-in-the-loop approval sub-protocol.

pub mod artifacts;
pub mod client;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod transcript;

pub use client::{ClientError, ConferenceClient};
pub use config::{ClientConfig, ConfigError};
pub use protocol::{ConferenceEvent, Decision, HitlDecision, SessionConfig};
pub use runtime::SessionUpdate;
pub use session::{HitlPhase, HitlState, SessionSnapshot};
