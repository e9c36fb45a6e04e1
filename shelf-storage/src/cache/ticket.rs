//! Fetch tickets for stale-read rejection.
//!
//! Every write to the cache and every fetch draws a number from the same
//! monotonically increasing sequence. A fetch takes its ticket *before* the
//! network call; when the result arrives it is applied only if nothing newer
//! has been written to the same key since (and no bulk replace newer than
//! the ticket has happened). Late results from superseded fetches are
//! therefore discarded instead of overwriting newer local state.

use std::fmt;

/// A point in the cache's write sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket {
    sequence: u64,
}

impl FetchTicket {
    pub(crate) fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Check if this ticket was issued after `other`.
    pub fn is_newer_than(&self, other: &FetchTicket) -> bool {
        self.sequence > other.sequence
    }

    /// A write stamped with `written` supersedes this ticket.
    pub fn is_superseded_by(&self, written: u64) -> bool {
        written > self.sequence
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.sequence)
    }
}
