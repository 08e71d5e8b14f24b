//! Per-path run ordering

use std::cmp::{Ordering, Reverse};

use crate::domain::{Run, special_scoring_for};

/// Sort key of a run within its path; smaller is better.
///
/// Ordinary paths rank by fewest days, then fewest turns. Special-scoring
/// paths rank by the highest extra score, and runs on those paths that lack
/// the score sort after every scored run. Runs of one path only ever produce
/// one kind of key, so the variant order never decides between paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RankKey {
    Fewest { days: i32, turns: i32 },
    Highest(Reverse<i64>),
    Unscored,
}

#[must_use]
pub fn rank_key(run: &Run) -> RankKey {
    match special_scoring_for(&run.path_name) {
        Some(kind) if run.extra.kind() == Some(kind) => {
            run.extra.value().map_or(RankKey::Unscored, |value| RankKey::Highest(Reverse(value)))
        }
        Some(_) => RankKey::Unscored,
        None => RankKey::Fewest {
            days: run.days,
            turns: run.turns,
        },
    }
}

/// Total order used by both passes: score first, then the lowest run identity
#[must_use]
pub fn compare_runs(a: &Run, b: &Run) -> Ordering {
    rank_key(a)
        .cmp(&rank_key(b))
        .then_with(|| a.key().cmp(&b.key()))
}
