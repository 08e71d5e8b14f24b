//! # Player ingestion task
//!
//! One task covers one candidate id on one leased session: the legacy history
//! page decides whether a player exists, the modern page is only fetched
//! for players that do.

use std::time::Duration;

use tracing::debug;

use crate::domain::{Player, Run};
use crate::infrastructure::parsing::{AscensionHistoryPage, parse_ascension_history};
use crate::infrastructure::session::{Session, SessionError, legacy_history_path, modern_history_path};

/// What a candidate id turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// No resolvable player (nonexistent, redacted or purged)
    Blank,
    /// Account exists but has never ascended
    NoRuns(Player),
    /// Legacy runs followed by modern runs
    Ingested { player: Player, runs: Vec<Run> },
}

/// Outcome tagged with its dispatch position
#[derive(Debug)]
pub struct TaskResult {
    pub seq: u64,
    pub player_id: i64,
    pub outcome: Result<TaskOutcome, SessionError>,
}

/// Identity and runs of a legacy page; the parsed document never outlives this call
fn read_legacy_page(html: &str, player_id: i64) -> (Option<Player>, Vec<Run>) {
    let page = AscensionHistoryPage::parse(html);
    let player = page.player();
    let runs = if player.is_some() {
        page.runs(player_id).collect()
    } else {
        Vec::new()
    };
    (player, runs)
}

/// Fetches and parses both history pages of `player_id`
pub async fn fetch_player(
    session: &mut dyn Session,
    player_id: i64,
    maintenance_retry: Duration,
) -> Result<TaskOutcome, SessionError> {
    let legacy_html = session
        .fetch_text_maintenance_safe(&legacy_history_path(player_id), maintenance_retry)
        .await?;
    let (player, mut runs) = read_legacy_page(&legacy_html, player_id);

    let Some(player) = player else {
        debug!("No player behind id {}", player_id);
        return Ok(TaskOutcome::Blank);
    };

    let modern_html = session
        .fetch_text_maintenance_safe(&modern_history_path(player_id), maintenance_retry)
        .await?;
    runs.extend(parse_ascension_history(&modern_html, player_id));

    if runs.is_empty() {
        return Ok(TaskOutcome::NoRuns(player));
    }

    debug!("{} ({}) has {} runs", player.name, player_id, runs.len());
    Ok(TaskOutcome::Ingested { player, runs })
}
