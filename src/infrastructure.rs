//! Infrastructure layer for configuration, logging, remote sessions, parsing and storage
//!
//! Everything that touches the network, the filesystem or the database lives here.

pub mod config;
pub mod database_connection;
pub mod logging; // Logging infrastructure
pub mod parsing;
pub mod record_store;
pub mod session;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{parse_ascension_history, parse_player, parse_recent_ascenders};
pub use record_store::{InsertMode, MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use session::{Session, SessionError, SessionWorker};
