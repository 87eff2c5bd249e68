//! Practice-session state machine and shared snapshot.
//!
//! [`SessionState`] tracks which phase of the speak → listen → score round
//! the session is in.  [`SessionSnapshot`] is the single source of truth a
//! front end reads to render the round: current phase, live level frame,
//! latest transcripts, attempt history, and any error message.
//!
//! [`SharedSession`] is a type alias for `Arc<Mutex<SessionSnapshot>>` —
//! cheap to clone and safe to share between the runner and a UI.

use std::sync::{Arc, Mutex};

use crate::audio::LevelFrame;
use crate::score::UtteranceComparison;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Phases of one practice round.
///
/// ```text
/// Idle ──SpeakPrompt──▶ Prompting ──prompt done──▶ Idle
///      ──BeginAttempt─▶ Listening ──final transcript──▶ Scoring ──▶ Result
/// any state ──error──▶ Error
/// Error / Result ──next command──▶ (Prompting | Listening)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the next command.
    #[default]
    Idle,

    /// The target word/phrase is being spoken to the learner.
    Prompting,

    /// The microphone is live; the learner's attempt is being captured.
    Listening,

    /// A final transcript arrived and is being scored.
    Scoring,

    /// The attempt has been scored; the comparison is in the snapshot.
    Result,

    /// Something failed.  The session returns to work on the next command.
    Error,
}

impl SessionState {
    /// `true` while audio is active or a score is being produced.
    ///
    /// Front ends use this to disable the prompt/attempt buttons.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Prompting | SessionState::Listening | SessionState::Scoring
        )
    }

    /// Short human-readable label for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Ready",
            SessionState::Prompting => "Listen…",
            SessionState::Listening => "Your turn",
            SessionState::Scoring => "Scoring",
            SessionState::Result => "Done",
            SessionState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Shared session state — everything a front end needs each frame.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current phase of the round.
    pub state: SessionState,

    /// Target text of the attempt in progress (set by `BeginAttempt`).
    pub target: Option<String>,

    /// Latest interim transcript while the learner is speaking.
    pub interim_text: Option<String>,

    /// Live level frame from whichever controller is active; reset to zeros
    /// whenever audio stops.
    pub levels: LevelFrame,

    /// The most recent scored attempt.
    pub last_result: Option<UtteranceComparison>,

    /// Every scored attempt this session, oldest first.
    pub history: Vec<UtteranceComparison>,

    /// Error message when `state == SessionState::Error`.
    pub error_message: Option<String>,
}

impl SessionSnapshot {
    /// Fresh snapshot with a rest-state level frame of `level_bins` bins.
    pub fn new(level_bins: usize) -> Self {
        Self {
            state: SessionState::Idle,
            target: None,
            interim_text: None,
            levels: LevelFrame::zeros(level_bins),
            last_result: None,
            history: Vec::new(),
            error_message: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SharedSession
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionSnapshot`].
///
/// Cheap to clone (`Arc` clone).  Lock for short critical sections only; do
/// **not** hold the lock across `.await` points.
pub type SharedSession = Arc<Mutex<SessionSnapshot>>;

/// Construct a new [`SharedSession`] with a rest-state snapshot.
pub fn new_shared_session(level_bins: usize) -> SharedSession {
    Arc::new(Mutex::new(SessionSnapshot::new(level_bins)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- SessionState::is_busy ---

    #[test]
    fn idle_result_and_error_are_not_busy() {
        assert!(!SessionState::Idle.is_busy());
        assert!(!SessionState::Result.is_busy());
        assert!(!SessionState::Error.is_busy());
    }

    #[test]
    fn active_phases_are_busy() {
        assert!(SessionState::Prompting.is_busy());
        assert!(SessionState::Listening.is_busy());
        assert!(SessionState::Scoring.is_busy());
    }

    // ---- labels ---

    #[test]
    fn labels_are_distinct() {
        let labels = [
            SessionState::Idle.label(),
            SessionState::Prompting.label(),
            SessionState::Listening.label(),
            SessionState::Scoring.label(),
            SessionState::Result.label(),
            SessionState::Error.label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    // ---- SessionSnapshot / SharedSession ---

    #[test]
    fn fresh_snapshot_is_at_rest() {
        let snap = SessionSnapshot::new(20);
        assert_eq!(snap.state, SessionState::Idle);
        assert!(snap.target.is_none());
        assert!(snap.levels.is_silent());
        assert_eq!(snap.levels.len(), 20);
        assert!(snap.history.is_empty());
        assert!(snap.error_message.is_none());
    }

    #[test]
    fn shared_session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedSession>();
    }

    #[test]
    fn shared_session_clones_see_mutations() {
        let session = new_shared_session(20);
        let session2 = Arc::clone(&session);

        session.lock().unwrap().state = SessionState::Listening;
        assert_eq!(session2.lock().unwrap().state, SessionState::Listening);
    }
}
