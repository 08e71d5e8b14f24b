//! Record store gateway
//!
//! [`RecordStore`] is the persistence boundary used by ingestion and tagging.
//! [`SqliteRecordStore`] is the production implementation; [`MemoryRecordStore`]
//! keeps everything in process and backs dry runs and tests.

#![allow(clippy::uninlined_format_args)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::domain::{
    ClassEntity, ExtraScore, FamiliarEntity, KnownDimensions, Lifestyle, PathEntity, Player, Run, Tag, TagType,
};

/// Conflict policy for runs that are already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Keep the stored row; normal ingestion
    #[default]
    SkipExisting,
    /// Overwrite the stored row; corrective re-parse
    Upsert,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates players or refreshes their display name
    async fn upsert_players(&self, players: &[Player]) -> Result<u64>;

    /// Returns how many rows were written
    async fn insert_runs(&self, runs: &[Run], mode: InsertMode) -> Result<u64>;

    async fn known_dimensions(&self) -> Result<KnownDimensions>;

    async fn create_paths(&self, paths: &[PathEntity]) -> Result<u64>;

    async fn create_classes(&self, classes: &[ClassEntity]) -> Result<u64>;

    async fn create_familiars(&self, familiars: &[FamiliarEntity]) -> Result<u64>;

    /// Fills in familiar icons that are still missing; existing icons are kept
    async fn set_familiar_images(&self, familiars: &[FamiliarEntity]) -> Result<u64>;

    async fn highest_player_id(&self) -> Result<Option<i64>>;

    async fn get_player(&self, id: i64) -> Result<Option<Player>>;

    async fn runs_for_player(&self, player_id: i64) -> Result<Vec<Run>>;

    /// Every run that is neither dropped nor abandoned
    async fn eligible_runs(&self) -> Result<Vec<Run>>;

    /// Deletes every tag of `tag_type` and inserts `tags` in one transaction
    async fn replace_tags(&self, tag_type: TagType, tags: &[Tag]) -> Result<u64>;

    async fn tags_of_type(&self, tag_type: TagType) -> Result<Vec<Tag>>;
}

/// SQLite implementation of [`RecordStore`]
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn run_from_row(row: &SqliteRow) -> Result<Run> {
        let lifestyle: String = row.try_get("lifestyle")?;
        let extra: String = row.try_get("extra")?;
        let extra: BTreeMap<String, i64> = serde_json::from_str(&extra)?;

        Ok(Run {
            player_id: row.try_get("player_id")?,
            run_number: row.try_get("ascension_number")?,
            date: row.try_get("date")?,
            level: row.try_get("level")?,
            class_name: row.try_get("class_name")?,
            sign: row.try_get("sign")?,
            turns: row.try_get("turns")?,
            days: row.try_get("days")?,
            familiar_name: row.try_get("familiar_name")?,
            familiar_percentage: row.try_get("familiar_percentage")?,
            familiar_image: None,
            lifestyle: lifestyle.parse::<Lifestyle>().map_err(|e| anyhow!(e))?,
            path_name: row.try_get("path_name")?,
            dropped: row.try_get("dropped")?,
            abandoned: row.try_get("abandoned")?,
            extra: ExtraScore::from_map(&extra),
        })
    }
}

const RUN_COLUMNS: &str = "player_id, ascension_number, date, level, class_name, sign, turns, days, \
     familiar_name, familiar_percentage, lifestyle, path_name, dropped, abandoned, extra";

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert_players(&self, players: &[Player]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for player in players {
            affected += sqlx::query(
                r#"
                INSERT INTO players (id, name) VALUES (?, ?)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(player.id)
            .bind(&player.name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn insert_runs(&self, runs: &[Run], mode: InsertMode) -> Result<u64> {
        let conflict = match mode {
            InsertMode::SkipExisting => "DO NOTHING",
            InsertMode::Upsert => {
                "DO UPDATE SET date = excluded.date, level = excluded.level, class_name = excluded.class_name, \
                 sign = excluded.sign, turns = excluded.turns, days = excluded.days, \
                 familiar_name = excluded.familiar_name, familiar_percentage = excluded.familiar_percentage, \
                 lifestyle = excluded.lifestyle, path_name = excluded.path_name, dropped = excluded.dropped, \
                 abandoned = excluded.abandoned, extra = excluded.extra"
            }
        };
        let sql = format!(
            "INSERT INTO ascensions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(player_id, ascension_number) {}",
            RUN_COLUMNS, conflict
        );

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for run in runs {
            let extra = serde_json::to_string(&run.extra.as_map())?;
            affected += sqlx::query(&sql)
                .bind(run.player_id)
                .bind(run.run_number)
                .bind(run.date)
                .bind(run.level)
                .bind(&run.class_name)
                .bind(&run.sign)
                .bind(run.turns)
                .bind(run.days)
                .bind(&run.familiar_name)
                .bind(run.familiar_percentage)
                .bind(run.lifestyle.as_str())
                .bind(&run.path_name)
                .bind(run.dropped)
                .bind(run.abandoned)
                .bind(extra)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn known_dimensions(&self) -> Result<KnownDimensions> {
        let mut known = KnownDimensions::default();

        for row in sqlx::query("SELECT name FROM paths").fetch_all(&self.pool).await? {
            known.paths.insert(row.try_get("name")?);
        }
        for row in sqlx::query("SELECT name FROM classes").fetch_all(&self.pool).await? {
            known.classes.insert(row.try_get("name")?);
        }
        for row in sqlx::query("SELECT name, image FROM familiars").fetch_all(&self.pool).await? {
            let name: String = row.try_get("name")?;
            let image: Option<String> = row.try_get("image")?;
            if image.is_some() {
                known.familiars_with_image.insert(name.clone());
            }
            known.familiars.insert(name);
        }

        Ok(known)
    }

    async fn create_paths(&self, paths: &[PathEntity]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for path in paths {
            affected += sqlx::query(
                "INSERT INTO paths (name, slug, image, start, end) VALUES (?, ?, ?, ?, ?) ON CONFLICT(name) DO NOTHING",
            )
            .bind(&path.name)
            .bind(&path.slug)
            .bind(&path.image)
            .bind(path.start)
            .bind(path.end)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn create_classes(&self, classes: &[ClassEntity]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for class in classes {
            affected += sqlx::query("INSERT INTO classes (name, image) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
                .bind(&class.name)
                .bind(&class.image)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn create_familiars(&self, familiars: &[FamiliarEntity]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for familiar in familiars {
            affected += sqlx::query("INSERT INTO familiars (name, image) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
                .bind(&familiar.name)
                .bind(&familiar.image)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn set_familiar_images(&self, familiars: &[FamiliarEntity]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for familiar in familiars {
            let Some(image) = &familiar.image else { continue };
            affected += sqlx::query("UPDATE familiars SET image = ? WHERE name = ? AND image IS NULL")
                .bind(image)
                .bind(&familiar.name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn highest_player_id(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM players")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("max_id")?)
    }

    async fn get_player(&self, id: i64) -> Result<Option<Player>> {
        let row = sqlx::query("SELECT id, name FROM players WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Player> {
            Ok(Player {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn runs_for_player(&self, player_id: i64) -> Result<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM ascensions WHERE player_id = ? ORDER BY ascension_number",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(player_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::run_from_row).collect()
    }

    async fn eligible_runs(&self) -> Result<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM ascensions WHERE dropped = 0 AND abandoned = 0 ORDER BY player_id, ascension_number",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::run_from_row).collect()
    }

    async fn replace_tags(&self, tag_type: TagType, tags: &[Tag]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tags WHERE type = ?")
            .bind(tag_type.as_str())
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        for tag in tags.iter().filter(|t| t.tag_type == tag_type) {
            inserted += sqlx::query(
                "INSERT INTO tags (type, value, player_id, ascension_number, year) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(tag.tag_type.as_str())
            .bind(tag.value)
            .bind(tag.player_id)
            .bind(tag.run_number)
            .bind(tag.year)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn tags_of_type(&self, tag_type: TagType) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT type, value, player_id, ascension_number, year FROM tags WHERE type = ? \
             ORDER BY player_id, ascension_number",
        )
        .bind(tag_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Tag> {
                let raw_type: String = row.try_get("type")?;
                Ok(Tag {
                    tag_type: raw_type.parse().map_err(|e: String| anyhow!(e))?,
                    value: row.try_get("value")?,
                    player_id: row.try_get("player_id")?,
                    run_number: row.try_get("ascension_number")?,
                    year: row.try_get("year")?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    players: BTreeMap<i64, String>,
    runs: BTreeMap<(i64, i32), Run>,
    paths: BTreeMap<String, PathEntity>,
    classes: BTreeMap<String, ClassEntity>,
    familiars: BTreeMap<String, FamiliarEntity>,
    tags: HashMap<TagType, Vec<Tag>>,
}

/// Process-local [`RecordStore`]; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    pub fn player_count(&self) -> Result<usize> {
        Ok(self.lock()?.players.len())
    }

    pub fn run_count(&self) -> Result<usize> {
        Ok(self.lock()?.runs.len())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_players(&self, players: &[Player]) -> Result<u64> {
        let mut state = self.lock()?;
        for player in players {
            state.players.insert(player.id, player.name.clone());
        }
        Ok(players.len() as u64)
    }

    async fn insert_runs(&self, runs: &[Run], mode: InsertMode) -> Result<u64> {
        let mut state = self.lock()?;
        let mut affected = 0;
        for run in runs {
            let exists = state.runs.contains_key(&run.key());
            if exists && mode == InsertMode::SkipExisting {
                continue;
            }
            let mut stored = run.clone();
            stored.familiar_image = None;
            state.runs.insert(run.key(), stored);
            affected += 1;
        }
        Ok(affected)
    }

    async fn known_dimensions(&self) -> Result<KnownDimensions> {
        let state = self.lock()?;
        Ok(KnownDimensions {
            paths: state.paths.keys().cloned().collect(),
            classes: state.classes.keys().cloned().collect(),
            familiars: state.familiars.keys().cloned().collect(),
            familiars_with_image: state
                .familiars
                .values()
                .filter(|f| f.image.is_some())
                .map(|f| f.name.clone())
                .collect(),
        })
    }

    async fn create_paths(&self, paths: &[PathEntity]) -> Result<u64> {
        let mut state = self.lock()?;
        let mut affected = 0;
        for path in paths {
            if !state.paths.contains_key(&path.name) {
                state.paths.insert(path.name.clone(), path.clone());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn create_classes(&self, classes: &[ClassEntity]) -> Result<u64> {
        let mut state = self.lock()?;
        let mut affected = 0;
        for class in classes {
            if !state.classes.contains_key(&class.name) {
                state.classes.insert(class.name.clone(), class.clone());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn create_familiars(&self, familiars: &[FamiliarEntity]) -> Result<u64> {
        let mut state = self.lock()?;
        let mut affected = 0;
        for familiar in familiars {
            if !state.familiars.contains_key(&familiar.name) {
                state.familiars.insert(familiar.name.clone(), familiar.clone());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn set_familiar_images(&self, familiars: &[FamiliarEntity]) -> Result<u64> {
        let mut state = self.lock()?;
        let mut affected = 0;
        for familiar in familiars {
            if let Some(stored) = state.familiars.get_mut(&familiar.name) {
                if stored.image.is_none() && familiar.image.is_some() {
                    stored.image.clone_from(&familiar.image);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    async fn highest_player_id(&self) -> Result<Option<i64>> {
        Ok(self.lock()?.players.keys().next_back().copied())
    }

    async fn get_player(&self, id: i64) -> Result<Option<Player>> {
        Ok(self.lock()?.players.get(&id).map(|name| Player::new(id, name.clone())))
    }

    async fn runs_for_player(&self, player_id: i64) -> Result<Vec<Run>> {
        Ok(self
            .lock()?
            .runs
            .range((player_id, i32::MIN)..=(player_id, i32::MAX))
            .map(|(_, run)| run.clone())
            .collect())
    }

    async fn eligible_runs(&self) -> Result<Vec<Run>> {
        Ok(self
            .lock()?
            .runs
            .values()
            .filter(|run| run.is_rankable())
            .cloned()
            .collect())
    }

    async fn replace_tags(&self, tag_type: TagType, tags: &[Tag]) -> Result<u64> {
        let fresh: Vec<Tag> = tags.iter().filter(|t| t.tag_type == tag_type).cloned().collect();
        let inserted = fresh.len() as u64;
        self.lock()?.tags.insert(tag_type, fresh);
        Ok(inserted)
    }

    async fn tags_of_type(&self, tag_type: TagType) -> Result<Vec<Tag>> {
        let mut tags = self.lock()?.tags.get(&tag_type).cloned().unwrap_or_default();
        tags.sort_by_key(|t| (t.player_id, t.run_number));
        Ok(tags)
    }
}
