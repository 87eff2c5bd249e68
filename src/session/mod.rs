//! Practice-session orchestration.
//!
//! Wires the synthesis and recognition controllers with the scorer into the
//! speak → listen → score round, and exposes the shared snapshot front ends
//! poll to render it.

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{PracticeSession, SessionCommand, SessionEvent};
pub use state::{new_shared_session, SessionSnapshot, SessionState, SharedSession};
