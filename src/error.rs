//! Fatal, non-match-failure errors.
//!
//! Match failure itself is never an error — it is the `Ok(MatchOutcome::NoMatch)`
//! return value. Everything here is resource exhaustion or a
//! match-time-function contract violation, both of which abandon the
//! match immediately.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("too many captures")]
    TooManyCaptures,

    #[error("too many captures lists")]
    TooManyCaptureLists,

    #[error("backtrack stack overflow (current limit is {limit})")]
    BacktrackStackOverflow { limit: usize },

    #[error("too many results in match-time capture")]
    TooManyMatchTimeResults,

    #[error("invalid position returned by match-time capture")]
    InvalidMatchTimePosition,

    #[error("malformed program: {reason}")]
    MalformedProgram { reason: &'static str },
}
