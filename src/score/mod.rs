//! Pronunciation scoring — transcript similarity and attempt records.
//!
//! The games feed each final transcript plus its target phrase through
//! [`PronunciationScorer`]; the resulting [`UtteranceComparison`] drives the
//! game's own scoring and feedback (owned by the caller, not by this crate).

pub mod scorer;
pub mod similarity;

pub use scorer::{PronunciationScorer, ScoreRating, UtteranceComparison};
pub use similarity::similarity;
