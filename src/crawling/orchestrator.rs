//! # Ingestion Orchestrator
//!
//! Drives candidate player ids through the session pool in batches:
//! dispatch up to `batch_size` ids, wait for every dispatched task, then
//! flush players, newly seen dimensions and runs to the record store.
//! Task results only ever reach the coordinator through the `JoinSet`, so the
//! batch accumulators have a single writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::crawling::state::{BlankPolicy, BlankStreak};
use crate::crawling::tasks::{TaskOutcome, TaskResult, fetch_player};
use crate::crawling::workers::WorkerPool;
use crate::domain::{KnownDimensions, NewDimensions, Player, Run};
use crate::infrastructure::config::{AppConfig, defaults};
use crate::infrastructure::parsing::parse_recent_ascenders;
use crate::infrastructure::record_store::{InsertMode, RecordStore};
use crate::infrastructure::session::SessionError;

/// Errors that abort an ingestion run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("session failure: {0}")]
    Session(#[from] SessionError),

    #[error("record store failure: {0:#}")]
    Store(anyhow::Error),

    #[error("ingestion task failed: {0}")]
    Task(#[from] JoinError),
}

/// Knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub consecutive_blank_threshold: u32,
    pub maintenance_retry: Duration,
    pub recent_ascenders_path: String,
}

impl IngestSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.ingestion.batch_size.max(1),
            consecutive_blank_threshold: config.ingestion.consecutive_blank_threshold,
            maintenance_retry: config.remote.maintenance_retry_interval(),
            recent_ascenders_path: config.remote.recent_ascenders_path.clone(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            consecutive_blank_threshold: defaults::CONSECUTIVE_BLANK_THRESHOLD,
            maintenance_retry: Duration::from_secs(defaults::MAINTENANCE_RETRY_SECONDS),
            recent_ascenders_path: defaults::RECENT_ASCENDERS_PATH.to_string(),
        }
    }
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub dispatched: u64,
    pub players_upserted: u64,
    pub runs_inserted: u64,
    /// Blank ids at or past the known ceiling
    pub blank_ids: u64,
    /// Blank ids below the ceiling (purged or retired accounts)
    pub purged_ids: u64,
    pub players_without_runs: u64,
    /// Ids whose fetch failed; they are not retried
    pub failed_ids: u64,
    pub new_paths: u64,
    pub new_classes: u64,
    pub new_familiars: u64,
    pub familiar_images: u64,
    /// A blank policy ended the run
    pub stopped_early: bool,
    /// Every candidate id was dispatched
    pub candidates_exhausted: bool,
}

/// Results of the tasks of the current batch
#[derive(Debug, Default)]
struct Batch {
    ingested: Vec<(Player, Vec<Run>)>,
}

/// Coordinator-side state of one ingestion run
struct RunState {
    policy: BlankPolicy,
    ceiling: i64,
    stop: Arc<AtomicBool>,
    streak: BlankStreak,
    batch: Batch,
    report: IngestReport,
}

impl RunState {
    fn new(policy: BlankPolicy, ceiling: i64, stop: Arc<AtomicBool>) -> Self {
        Self {
            policy,
            ceiling,
            stop,
            streak: BlankStreak::default(),
            batch: Batch::default(),
            report: IngestReport::default(),
        }
    }

    fn request_stop(&mut self, reason: &str) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("🛑 Stopping dispatch: {}", reason);
        }
        self.report.stopped_early = true;
    }

    fn absorb(&mut self, result: TaskResult) {
        let TaskResult { seq, player_id, outcome } = result;
        match outcome {
            Ok(TaskOutcome::Ingested { player, runs }) => self.batch.ingested.push((player, runs)),
            Ok(TaskOutcome::NoRuns(player)) => {
                debug!("{} ({}) has never ascended", player.name, player.id);
                self.report.players_without_runs += 1;
            }
            Ok(TaskOutcome::Blank) if player_id < self.ceiling => {
                self.report.purged_ids += 1;
            }
            Ok(TaskOutcome::Blank) => {
                self.report.blank_ids += 1;
                match self.policy {
                    BlankPolicy::Ignore => {}
                    BlankPolicy::StopAtFirstBlankPastCeiling => {
                        self.request_stop(&format!("id {player_id} is blank past ceiling {}", self.ceiling));
                    }
                    BlankPolicy::StopAfterConsecutiveBlanks(threshold) => {
                        let streak = self.streak.record_blank(seq);
                        if streak >= threshold {
                            self.request_stop(&format!("{streak} consecutive blank ids ending near {player_id}"));
                        }
                    }
                }
            }
            Err(e) => {
                warn!("⚠️  Skipping player {}: {}", player_id, e);
                self.report.failed_ids += 1;
            }
        }
    }
}

/// Schedules candidate ids across the session pool and persists the results
pub struct IngestionOrchestrator {
    store: Arc<dyn RecordStore>,
    pool: WorkerPool,
    settings: IngestSettings,
    stop: Arc<AtomicBool>,
}

impl IngestionOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, pool: WorkerPool, settings: IngestSettings) -> Self {
        Self {
            store,
            pool,
            settings,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops dispatch of new ids; in-flight tasks still finish
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Ingests an explicit list of ids; blanks never stop the run
    pub async fn ingest_ids(&mut self, ids: Vec<i64>) -> Result<IngestReport, IngestError> {
        self.ingest(ids, BlankPolicy::Ignore, InsertMode::SkipExisting).await
    }

    /// Walks upward from the highest stored id until the first blank
    pub async fn discover_new_players(&mut self) -> Result<IngestReport, IngestError> {
        let ceiling = self.highest_player_id().await?;
        info!("🔭 Discovering players above id {}", ceiling);
        self.ingest(ceiling + 1.., BlankPolicy::StopAtFirstBlankPastCeiling, InsertMode::SkipExisting)
            .await
    }

    /// Scans `from..=to` (unbounded without `to`), ending after a run of consecutive blanks
    pub async fn scan_range(&mut self, from: i64, to: Option<i64>) -> Result<IngestReport, IngestError> {
        let policy = BlankPolicy::StopAfterConsecutiveBlanks(self.settings.consecutive_blank_threshold);
        match to {
            Some(to) => self.ingest(from..=to, policy, InsertMode::SkipExisting).await,
            None => self.ingest(from.., policy, InsertMode::SkipExisting).await,
        }
    }

    /// Ingests everyone on the recent-ascenders listing
    pub async fn ingest_recent_ascenders(&mut self) -> Result<IngestReport, IngestError> {
        let html = {
            let mut lease = self.pool.acquire().await;
            lease
                .fetch_text_maintenance_safe(&self.settings.recent_ascenders_path, self.settings.maintenance_retry)
                .await?
        };
        let ids: Vec<i64> = parse_recent_ascenders(&html).into_iter().map(|p| p.id).collect();
        info!("📋 {} recent ascenders listed", ids.len());
        self.ingest(ids, BlankPolicy::Ignore, InsertMode::SkipExisting).await
    }

    /// Re-fetches players and overwrites their stored runs
    pub async fn reparse_players(&mut self, ids: Vec<i64>) -> Result<IngestReport, IngestError> {
        self.ingest(ids, BlankPolicy::Ignore, InsertMode::Upsert).await
    }

    async fn highest_player_id(&self) -> Result<i64, IngestError> {
        Ok(self
            .store
            .highest_player_id()
            .await
            .map_err(IngestError::Store)?
            .unwrap_or(0))
    }

    /// Runs the candidate sequence to exhaustion or until stopped
    pub async fn ingest<I>(&mut self, ids: I, policy: BlankPolicy, mode: InsertMode) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = i64>,
    {
        let started = Instant::now();
        self.stop.store(false, Ordering::SeqCst);

        let ceiling = self.highest_player_id().await?;
        let mut known = self.store.known_dimensions().await.map_err(IngestError::Store)?;
        info!(
            "🚀 Ingestion started: {} sessions, batch size {}, policy {:?}, mode {:?}",
            self.pool.size(),
            self.settings.batch_size,
            policy,
            mode
        );

        let mut ids = ids.into_iter();
        let mut state = RunState::new(policy, ceiling, Arc::clone(&self.stop));
        let mut seq: u64 = 0;
        let mut exhausted = false;

        while !exhausted && !self.stop.load(Ordering::SeqCst) {
            let mut tasks: JoinSet<TaskResult> = JoinSet::new();
            let mut dispatched = 0;

            while dispatched < self.settings.batch_size && !self.stop.load(Ordering::SeqCst) {
                let mut lease = tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next() => {
                        state.absorb(joined?);
                        continue;
                    }
                    lease = self.pool.acquire() => lease,
                };
                if self.stop.load(Ordering::SeqCst) {
                    break;
                }
                let Some(player_id) = ids.next() else {
                    exhausted = true;
                    state.report.candidates_exhausted = true;
                    break;
                };

                let task_seq = seq;
                let retry = self.settings.maintenance_retry;
                tasks.spawn(async move {
                    let outcome = fetch_player(&mut *lease, player_id, retry).await;
                    TaskResult {
                        seq: task_seq,
                        player_id,
                        outcome,
                    }
                });
                seq += 1;
                dispatched += 1;
                state.report.dispatched += 1;
            }

            while let Some(joined) = tasks.join_next().await {
                state.absorb(joined?);
            }

            let batch = std::mem::take(&mut state.batch);
            self.flush(batch, &mut known, mode, &mut state.report).await?;
            state.streak.end_batch(seq);

            info!(
                "📦 Progress: {} dispatched, {} players, {} runs, {} blank",
                state.report.dispatched, state.report.players_upserted, state.report.runs_inserted, state.report.blank_ids
            );
        }

        let report = state.report;
        info!("✅ Ingestion finished in {:?}: {:?}", started.elapsed(), report);
        Ok(report)
    }

    /// Players first, then dimensions the runs reference, then the runs themselves
    async fn flush(
        &self,
        batch: Batch,
        known: &mut KnownDimensions,
        mode: InsertMode,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        if batch.ingested.is_empty() {
            return Ok(());
        }

        let mut ingested = batch.ingested;
        ingested.sort_by_key(|(player, _)| player.id);
        let (players, runs): (Vec<Player>, Vec<Vec<Run>>) = ingested.into_iter().unzip();
        let runs: Vec<Run> = runs.into_iter().flatten().collect();

        report.players_upserted += self.store.upsert_players(&players).await.map_err(IngestError::Store)?;

        let new = NewDimensions::discover(&runs, known);
        if !new.is_empty() {
            report.new_paths += self.store.create_paths(&new.paths).await.map_err(IngestError::Store)?;
            report.new_classes += self.store.create_classes(&new.classes).await.map_err(IngestError::Store)?;
            report.new_familiars += self
                .store
                .create_familiars(&new.familiars)
                .await
                .map_err(IngestError::Store)?;
            report.familiar_images += self
                .store
                .set_familiar_images(&new.familiar_images)
                .await
                .map_err(IngestError::Store)?;
            for path in &new.paths {
                info!("🆕 New path discovered: {}", path.name);
            }
            known.absorb(&new);
        }

        report.runs_inserted += self.store.insert_runs(&runs, mode).await.map_err(IngestError::Store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(seq: u64, player_id: i64) -> TaskResult {
        TaskResult {
            seq,
            player_id,
            outcome: Ok(TaskOutcome::Blank),
        }
    }

    fn state(policy: BlankPolicy, ceiling: i64) -> RunState {
        RunState::new(policy, ceiling, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn blanks_below_ceiling_are_purged_accounts() {
        let mut run = state(BlankPolicy::StopAtFirstBlankPastCeiling, 100);
        run.absorb(blank(0, 42));
        assert_eq!(run.report.purged_ids, 1);
        assert_eq!(run.report.blank_ids, 0);
        assert!(!run.stop.load(Ordering::SeqCst));
    }

    #[test]
    fn first_blank_past_ceiling_stops() {
        let mut run = state(BlankPolicy::StopAtFirstBlankPastCeiling, 100);
        run.absorb(blank(0, 100));
        assert!(run.stop.load(Ordering::SeqCst));
        assert!(run.report.stopped_early);
    }

    #[test]
    fn consecutive_blank_threshold() {
        let mut run = state(BlankPolicy::StopAfterConsecutiveBlanks(3), 0);
        run.absorb(blank(0, 1));
        run.absorb(blank(2, 3));
        assert!(!run.stop.load(Ordering::SeqCst));
        run.absorb(blank(1, 2));
        assert!(run.stop.load(Ordering::SeqCst));
    }

    #[test]
    fn ignore_policy_counts_but_never_stops() {
        let mut run = state(BlankPolicy::Ignore, 0);
        for seq in 0..50 {
            run.absorb(blank(seq, seq as i64 + 1));
        }
        assert_eq!(run.report.blank_ids, 50);
        assert!(!run.stop.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_fetches_are_counted() {
        let mut run = state(BlankPolicy::Ignore, 0);
        run.absorb(TaskResult {
            seq: 0,
            player_id: 5,
            outcome: Err(SessionError::LoggedOut {
                label: "bot".to_string(),
            }),
        });
        assert_eq!(run.report.failed_ids, 1);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.ingestion.batch_size = 0;
        config.remote.maintenance_retry_seconds = 5;
        let settings = IngestSettings::from_config(&config);
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.maintenance_retry, Duration::from_secs(5));
    }
}
