// Database connection and pool management
// SQLite through sqlx; the schema is created in place by `migrate`

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_pool(self) -> SqlitePool {
        self.pool
    }

    /// Creates every table and index that does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        let create_players_sql = r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_paths_sql = r#"
            CREATE TABLE IF NOT EXISTS paths (
                name TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                image TEXT,
                start DATE,
                end DATE
            )
        "#;

        let create_classes_sql = r#"
            CREATE TABLE IF NOT EXISTS classes (
                name TEXT PRIMARY KEY,
                image TEXT
            )
        "#;

        let create_familiars_sql = r#"
            CREATE TABLE IF NOT EXISTS familiars (
                name TEXT PRIMARY KEY,
                image TEXT
            )
        "#;

        let create_ascensions_sql = r#"
            CREATE TABLE IF NOT EXISTS ascensions (
                player_id INTEGER NOT NULL,
                ascension_number INTEGER NOT NULL,
                date DATE NOT NULL,
                level INTEGER NOT NULL,
                class_name TEXT NOT NULL,
                sign TEXT NOT NULL,
                turns INTEGER NOT NULL,
                days INTEGER NOT NULL,
                familiar_name TEXT NOT NULL,
                familiar_percentage REAL NOT NULL,
                lifestyle TEXT NOT NULL,
                path_name TEXT NOT NULL,
                dropped BOOLEAN NOT NULL DEFAULT 0,
                abandoned BOOLEAN NOT NULL DEFAULT 0,
                extra TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (player_id, ascension_number),
                FOREIGN KEY (player_id) REFERENCES players (id)
            )
        "#;

        let create_tags_sql = r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                value INTEGER,
                player_id INTEGER NOT NULL,
                ascension_number INTEGER NOT NULL,
                year INTEGER,
                FOREIGN KEY (player_id, ascension_number) REFERENCES ascensions (player_id, ascension_number)
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_ascensions_path_lifestyle ON ascensions (path_name, lifestyle, date)",
            "CREATE INDEX IF NOT EXISTS idx_tags_type ON tags (type)",
            "CREATE INDEX IF NOT EXISTS idx_tags_run ON tags (player_id, ascension_number)",
        ];

        for sql in [
            create_players_sql,
            create_paths_sql,
            create_classes_sql,
            create_familiars_sql,
            create_ascensions_sql,
            create_tags_sql,
        ]
        .into_iter()
        .chain(create_indexes_sql)
        {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        info!("🗄️  Database schema ready");
        Ok(())
    }
}
