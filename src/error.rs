//! Typed error hierarchy for the assessment pipeline.
//!
//! Callers pattern-match on [`Error`] variants instead of string-matching
//! messages. Expected conditions (not found, conflict, failed precondition)
//! are distinct from infrastructure failures (store, provider), so the
//! transport layer can map them to the right response without inspecting
//! error text.

use thiserror::Error;

/// All failure modes surfaced by the core pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Material text was empty or unreadable after cleaning. Not retried.
    #[error("source text is empty or unreadable: {0}")]
    EmptyOrUnreadableSource(String),

    /// A language-model call exhausted its retries or returned output that
    /// could not be parsed. Distinct from ingestion failure so callers can
    /// tell "bad source" apart from "model unavailable".
    #[error("generation failed after {attempts} attempts: {reason}")]
    Generation { attempts: u32, reason: String },

    /// A referenced row does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// An operation attempted an invalid transition: finalizing out of
    /// order, answering twice, acting on a session the caller does not
    /// own, or an insert that violated per-row uniqueness.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A finalize-style gate failed its preconditions. Carries the reason
    /// so the caller can report exactly what is missing.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Persistent-store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Embedding or language-model provider transport failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Blob storage failure.
    #[error("blob store error: {0}")]
    Blob(#[from] std::io::Error),
}

impl Error {
    /// True for the variants that represent an expected, caller-resolvable
    /// condition rather than an infrastructure fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_distinguishable() {
        let err = Error::Conflict("question already answered".into());
        assert!(err.is_conflict());
        assert!(!Error::NotFound("session 7".into()).is_conflict());
    }

    #[test]
    fn display_carries_reason() {
        let err = Error::Generation {
            attempts: 3,
            reason: "empty response".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("empty response"));
    }
}
