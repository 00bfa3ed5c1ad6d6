//! Harvest coordination
//!
//! The coordinator builds one browser session per worker, seeds a shared
//! [`WorkQueue`] with the deduplicated URL list, runs every worker as its own
//! tokio task and merges what they return. Dropped items never fail a run;
//! they show up in [`HarvestReport::dropped`].

use crate::{
    HarvestError, HarvestSettings, HarvestWorker, ItemFailure, ItemRecord, PageSession,
    SessionFactory, WorkQueue, WorkerStats,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of one harvest run
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requested_urls: usize,
    pub unique_urls: usize,
    pub records: Vec<ItemRecord>,
    pub workers: Vec<WorkerStats>,
    pub dropped: Vec<ItemFailure>,
    pub rotations: usize,
    pub aborted_workers: usize,
}

impl HarvestReport {
    pub fn harvested(&self) -> usize {
        self.records.len()
    }

    /// URLs that were neither harvested nor dropped, left behind by workers
    /// that stopped early or panicked
    pub fn unprocessed(&self) -> usize {
        self.unique_urls
            .saturating_sub(self.records.len() + self.dropped.len())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub struct HarvestCoordinator<F: SessionFactory> {
    factory: Arc<F>,
    settings: HarvestSettings,
}

impl<F: SessionFactory> HarvestCoordinator<F> {
    pub fn new(factory: Arc<F>, settings: HarvestSettings) -> Result<Self, HarvestError> {
        settings.layout.validate()?;
        Ok(Self { factory, settings })
    }

    /// Harvest every URL with `pool_size` workers; the merged records come
    /// back in no particular order
    pub async fn harvest(
        &self,
        urls: Vec<String>,
        pool_size: usize,
        rotation_frequency: Option<usize>,
    ) -> Result<Vec<ItemRecord>, HarvestError> {
        Ok(self
            .harvest_with_report(urls, pool_size, rotation_frequency)
            .await?
            .records)
    }

    pub async fn harvest_with_report(
        &self,
        urls: Vec<String>,
        pool_size: usize,
        rotation_frequency: Option<usize>,
    ) -> Result<HarvestReport, HarvestError> {
        if pool_size == 0 {
            return Err(HarvestError::Validation(
                "pool size must be greater than 0".to_string(),
            ));
        }
        if rotation_frequency == Some(0) {
            return Err(HarvestError::Validation(
                "rotation frequency must be greater than 0 when set".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let requested_urls = urls.len();
        let unique = dedup_preserving_order(urls);
        let unique_urls = unique.len();

        let mut report = HarvestReport {
            run_id,
            started_at,
            finished_at: started_at,
            requested_urls,
            unique_urls,
            records: Vec::new(),
            workers: Vec::new(),
            dropped: Vec::new(),
            rotations: 0,
            aborted_workers: 0,
        };

        if unique.is_empty() {
            info!("Harvest run {} has no URLs to process", run_id);
            report.finished_at = Utc::now();
            return Ok(report);
        }

        info!(
            "Harvest run {}: {} URLs ({} unique) with {} workers",
            run_id, requested_urls, unique_urls, pool_size
        );

        let sessions = self.build_sessions(pool_size).await?;
        let queue: WorkQueue = Arc::new(Mutex::new(unique.into_iter().collect::<VecDeque<_>>()));

        let mut tasks = JoinSet::new();
        for (id, session) in sessions.into_iter().enumerate() {
            let worker = HarvestWorker::new(
                id,
                self.factory.clone(),
                session,
                self.settings.clone(),
                rotation_frequency,
            );
            tasks.spawn(worker.run(queue.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.rotations += outcome.stats.rotations;
                    if outcome.aborted {
                        report.aborted_workers += 1;
                    }
                    report.records.extend(outcome.records);
                    report.dropped.extend(outcome.failures);
                    report.workers.push(outcome.stats);
                }
                Err(e) if e.is_panic() => {
                    error!("Harvest worker panicked; its items are lost: {}", e);
                }
                Err(e) => {
                    error!("Harvest worker task failed: {}", e);
                }
            }
        }

        report.workers.sort_by_key(|stats| stats.id);
        report.finished_at = Utc::now();

        if !report.dropped.is_empty() {
            warn!(
                "Harvest run {} dropped {} of {} films",
                run_id,
                report.dropped.len(),
                unique_urls
            );
        }
        info!(
            "Harvest run {} finished: {} films in {}s",
            run_id,
            report.harvested(),
            report.duration().num_seconds()
        );

        Ok(report)
    }

    /// Build `count` sessions concurrently; on any failure close the ones
    /// that were built and return the first error
    async fn build_sessions(&self, count: usize) -> Result<Vec<F::Session>, HarvestError> {
        let results = join_all((0..count).map(|_| self.factory.create())).await;

        let mut sessions = Vec::with_capacity(count);
        let mut first_error = None;
        for result in results {
            match result {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    error!("Failed to create browser session: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            for mut session in sessions {
                if let Err(close_error) = session.close().await {
                    warn!("Failed to close browser session: {}", close_error);
                }
            }
            return Err(e);
        }

        Ok(sessions)
    }
}

/// Drop repeated URLs, keeping the first occurrence of each
pub fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
