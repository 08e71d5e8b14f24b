//! # Tagging Module
//!
//! Derived tags computed from the stored run corpus: record-breaking runs
//! per path and lifestyle, and each player's personal bests.

pub mod engine;
pub mod passes;
pub mod scoring;

pub use engine::{TaggingEngine, TaggingReport};
pub use passes::{personal_best, record_breaking};
pub use scoring::{RankKey, compare_runs, rank_key};
