/// Article state definitions for tracking crawl progress
///
/// An article moves `Queued -> Working -> Ready`. Crash recovery is the only
/// path back from `Working` to `Queued`.
use std::fmt;

/// Represents the current state of an article in the crawl graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArticleState {
    /// Article is known and waiting to be claimed by a worker batch
    Queued,

    /// Article has been claimed and its fetch is in flight
    Working,

    /// Article was fetched and its outgoing edges are recorded
    Ready,
}

impl ArticleState {
    /// Returns true if a transition from `self` to `next` is allowed
    ///
    /// `Working -> Queued` is only legal as part of stale-work recovery.
    pub fn can_transition_to(&self, next: ArticleState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Working)
                | (Self::Working, Self::Ready)
                | (Self::Working, Self::Queued)
        )
    }

    /// Converts the state to its persisted integer representation
    pub fn to_db_value(&self) -> i64 {
        match self {
            Self::Queued => 0,
            Self::Working => 1,
            Self::Ready => 2,
        }
    }

    /// Parses a state from its persisted integer representation
    ///
    /// Returns None if the value doesn't match any known state.
    pub fn from_db_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Queued),
            1 => Some(Self::Working),
            2 => Some(Self::Ready),
            _ => None,
        }
    }

    /// Returns all possible article states
    pub fn all_states() -> [Self; 3] {
        [Self::Queued, Self::Working, Self::Ready]
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Working => "working",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ArticleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
