//! Ascension Tracker - Kingdom of Loathing ascension history ingestion
//!
//! Crawls player ascension histories through a pool of authenticated game
//! sessions, stores players and runs, and derives record-breaking and
//! personal-best tags from the stored corpus.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;
pub mod tagging;

pub use crawling::{IngestReport, IngestionOrchestrator};
pub use tagging::{TaggingEngine, TaggingReport};
