//! Domain module - Core entities and value objects
//!
//! Runs, players, dimension entities and tags. Nothing in here performs I/O.

pub mod ascension;
pub mod entities;
pub mod slug;
pub mod tag;

// Re-export commonly used items for convenience
pub use ascension::{ExtraKind, ExtraScore, Lifestyle, NONE_VALUE, Run, special_scoring_for};
pub use entities::{ClassEntity, FamiliarEntity, KnownDimensions, NewDimensions, PathEntity, Player};
pub use slug::slugify;
pub use tag::{Tag, TagType};
