//! # Crawling Module
//!
//! Ingestion of player histories: session pool, per-player tasks, blank-id
//! stop policies and the batch orchestrator that ties them together.

pub mod orchestrator;
pub mod state;
pub mod tasks;
pub mod workers;

pub use orchestrator::{IngestError, IngestReport, IngestSettings, IngestionOrchestrator};
pub use state::BlankPolicy;
pub use tasks::{TaskOutcome, fetch_player};
pub use workers::{SessionLease, WorkerPool, WorkerPoolStats};

pub use crate::infrastructure::record_store::InsertMode;
