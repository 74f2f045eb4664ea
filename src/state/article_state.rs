//! Per-article processing states
//!
//! Every identifier handed to the worker pool moves through:
//!
//! ```text
//! Pending -> Extracting -> Extracted -> Committing -> Committed
//!                 |                          |
//!                 +--------> Failed <--------+
//!                              |
//!                              +-> Skipped
//! ```
//!
//! `Failed` without a following `Skipped` means the identifier is left for
//! a later run; `Skipped` means it is given up for good.
use crate::HarvestError;
use std::fmt;

/// Represents the current state of one article in the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleState {
    /// Waiting for a free worker slot
    Pending,

    /// Detail document and attachments are being fetched
    Extracting,

    /// Record built, waiting for the storage writer
    Extracted,

    /// Inside the storage writer's critical section
    Committing,

    /// Record and crawl state are durable
    Committed,

    /// Extraction or commit failed
    Failed,

    /// Failure was logged and the identifier is given up
    Skipped,
}

impl ArticleState {
    /// Returns true if no further transition is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed | Self::Skipped)
    }

    /// Returns true if this transition is allowed
    pub fn can_transition_to(&self, next: ArticleState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Extracting)
                | (Self::Extracting, Self::Extracted)
                | (Self::Extracting, Self::Failed)
                | (Self::Extracted, Self::Committing)
                | (Self::Committing, Self::Committed)
                | (Self::Committing, Self::Failed)
                | (Self::Failed, Self::Skipped)
        )
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow
    pub fn advance(self, next: ArticleState) -> Result<ArticleState, HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Short lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Extracted => "extracted",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns all article states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Extracting,
            Self::Extracted,
            Self::Committing,
            Self::Committed,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for ArticleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = ArticleState::Pending
            .advance(ArticleState::Extracting)
            .and_then(|s| s.advance(ArticleState::Extracted))
            .and_then(|s| s.advance(ArticleState::Committing))
            .and_then(|s| s.advance(ArticleState::Committed))
            .unwrap();
        assert_eq!(state, ArticleState::Committed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failure_then_skip() {
        let state = ArticleState::Extracting
            .advance(ArticleState::Failed)
            .and_then(|s| s.advance(ArticleState::Skipped))
            .unwrap();
        assert_eq!(state, ArticleState::Skipped);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(ArticleState::Pending
            .advance(ArticleState::Committed)
            .is_err());
        assert!(ArticleState::Committed
            .advance(ArticleState::Extracting)
            .is_err());
        assert!(ArticleState::Skipped
            .advance(ArticleState::Pending)
            .is_err());
        assert!(matches!(
            ArticleState::Extracted.advance(ArticleState::Committed),
            Err(HarvestError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_is_terminal() {
        assert!(!ArticleState::Pending.is_terminal());
        assert!(!ArticleState::Extracting.is_terminal());
        assert!(!ArticleState::Extracted.is_terminal());
        assert!(!ArticleState::Committing.is_terminal());

        assert!(ArticleState::Committed.is_terminal());
        assert!(ArticleState::Failed.is_terminal());
        assert!(ArticleState::Skipped.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ArticleState::Pending), "pending");
        assert_eq!(format!("{}", ArticleState::Committed), "committed");
    }

    #[test]
    fn test_all_states_distinct() {
        let all = ArticleState::all_states();
        assert_eq!(all.len(), 7);
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }
}
