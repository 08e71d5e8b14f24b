//! # Blank-id stop policies
//!
//! A candidate id with no resolvable player is a "blank". Past the highest id
//! already known to be valid, blanks mean the id space is running out and may
//! end ingestion early; below it they are purged accounts and never do.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// When blanks past the known ceiling stop further dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlankPolicy {
    /// Blanks never stop ingestion
    #[default]
    Ignore,
    /// The first blank at or beyond the ceiling stops dispatch
    StopAtFirstBlankPastCeiling,
    /// Stop once this many consecutive candidates (in dispatch order) are blank
    StopAfterConsecutiveBlanks(u32),
}

/// Tracks runs of consecutive blank candidates while results arrive out of order.
///
/// Candidates are identified by dispatch sequence number. Within a batch the
/// blank sequence numbers are kept in a set; when a batch ends only the length
/// of the streak touching its last candidate is carried into the next one.
#[derive(Debug, Default)]
pub struct BlankStreak {
    batch_start: u64,
    carry: u32,
    blanks: BTreeSet<u64>,
}

impl BlankStreak {
    /// Records a blank at `seq` and returns the length of the streak containing it
    pub fn record_blank(&mut self, seq: u64) -> u32 {
        self.blanks.insert(seq);

        let mut low = seq;
        while low > self.batch_start && self.blanks.contains(&(low - 1)) {
            low -= 1;
        }
        let mut high = seq;
        while self.blanks.contains(&(high + 1)) {
            high += 1;
        }

        let mut length = (high - low + 1) as u32;
        if low == self.batch_start {
            length += self.carry;
        }
        length
    }

    /// Closes the batch whose candidates ended just before `next_seq`
    pub fn end_batch(&mut self, next_seq: u64) {
        let mut trailing = 0u32;
        let mut seq = next_seq;
        while seq > self.batch_start && self.blanks.contains(&(seq - 1)) {
            seq -= 1;
            trailing += 1;
        }

        self.carry = if seq == self.batch_start {
            trailing + self.carry
        } else {
            trailing
        };
        self.blanks.clear();
        self.batch_start = next_seq;
    }
}
