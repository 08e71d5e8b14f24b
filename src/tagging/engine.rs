//! # Tagging Engine
//!
//! Full recompute of the derived tag types. Each pass replaces its whole tag
//! type inside one store transaction; the two passes run concurrently.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::passes::{personal_best, record_breaking};
use crate::domain::TagType;
use crate::infrastructure::record_store::RecordStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaggingReport {
    pub eligible_runs: usize,
    pub record_breaking: u64,
    pub personal_best: u64,
}

pub struct TaggingEngine {
    store: Arc<dyn RecordStore>,
    ns13_cutoff: NaiveDate,
}

impl TaggingEngine {
    pub fn new(store: Arc<dyn RecordStore>, ns13_cutoff: NaiveDate) -> Self {
        Self { store, ns13_cutoff }
    }

    pub async fn run(&self) -> Result<TaggingReport> {
        let started = Instant::now();
        let runs = self
            .store
            .eligible_runs()
            .await
            .context("Failed to load eligible runs")?;
        info!("🏷️  Tagging {} eligible runs (records from {})", runs.len(), self.ns13_cutoff);

        let runs = Arc::new(runs);
        let cutoff = self.ns13_cutoff;

        let record_pass = {
            let runs = Arc::clone(&runs);
            let store = Arc::clone(&self.store);
            async move {
                let tags = tokio::task::spawn_blocking(move || record_breaking(&runs, cutoff)).await?;
                store
                    .replace_tags(TagType::RecordBreaking, &tags)
                    .await
                    .context("Failed to replace record-breaking tags")
            }
        };

        let personal_pass = {
            let runs = Arc::clone(&runs);
            let store = Arc::clone(&self.store);
            async move {
                let tags = tokio::task::spawn_blocking(move || personal_best(&runs)).await?;
                store
                    .replace_tags(TagType::PersonalBest, &tags)
                    .await
                    .context("Failed to replace personal-best tags")
            }
        };

        let (record_breaking, personal_best) = tokio::try_join!(record_pass, personal_pass)?;

        let report = TaggingReport {
            eligible_runs: runs.len(),
            record_breaking,
            personal_best,
        };
        info!("✅ Tagging finished in {:?}: {:?}", started.elapsed(), report);
        Ok(report)
    }
}
