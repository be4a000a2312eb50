//! Core session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! connection callbacks and caller commands are [`Event`]s, and every
//! observable consequence is returned as an [`Effect`] for the runtime.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{
    ActiveSession, ConnectionState, Epoch, HitlPhase, HitlState, Protocol, SessionContext,
    SessionSnapshot, SessionState,
};
pub use transition::{transition, TransitionError, TransitionResult};
