//! Periodic ingestion against one fixed source.
//!
//! The scheduled job and API-triggered jobs are not coordinated with each
//! other; the store serializes their batches and deduplicates rows.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::common_scraper::{ingest_and_store, IngestionOptions, IngestionOutcome, DEFAULT_PAGES};
use crate::error::AppError;
use crate::scrapers::SourceProvider;
use crate::store::Store;

pub const WEEKLY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub source_key: String,
    pub pages: u32,
    pub period: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            source_key: "bj".to_string(),
            pages: DEFAULT_PAGES,
            period: WEEKLY,
        }
    }
}

/// Running scheduler plus the time of its next firing.
pub struct ScheduleHandle {
    scheduler: JobScheduler,
    next_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl ScheduleHandle {
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.next_run.lock().ok().and_then(|next| *next)
    }

    /// Shared view of the next firing time, for the API's health route.
    pub fn next_run_cell(&self) -> Arc<Mutex<Option<DateTime<Utc>>>> {
        self.next_run.clone()
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .context("Failed to stop scheduler")
    }
}

pub async fn start_scheduler(
    store: Arc<Store>,
    provider: Arc<dyn SourceProvider>,
    config: ScheduleConfig,
) -> Result<ScheduleHandle> {
    let scheduler = JobScheduler::new().await?;
    let next_run = Arc::new(Mutex::new(Some(next_firing(config.period))));

    let job_next_run = next_run.clone();
    let job_config = config.clone();
    let job = Job::new_repeated_async(config.period, move |_uuid, _lock| {
        let store = store.clone();
        let provider = provider.clone();
        let config = job_config.clone();
        let next_run = job_next_run.clone();
        Box::pin(async move {
            if let Ok(mut next) = next_run.lock() {
                *next = Some(next_firing(config.period));
            }

            let source_key = config.source_key.clone();
            let result = tokio::task::spawn_blocking(move || {
                run_scheduled_cycle(&store, provider.as_ref(), &config)
            })
            .await;

            match result {
                Ok(Ok(outcome)) => tracing::info!(
                    "Scheduled scrape of {} completed: {} found, {} new",
                    source_key,
                    outcome.found,
                    outcome.inserted
                ),
                Ok(Err(e)) => tracing::error!("Scheduled scrape of {} failed: {}", source_key, e),
                Err(e) => tracing::error!("Scheduled scrape of {} panicked: {}", source_key, e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(
        "Scheduled scraping of {} ({} pages) every {}h",
        config.source_key,
        config.pages,
        config.period.as_secs() / 3600
    );

    Ok(ScheduleHandle {
        scheduler,
        next_run,
    })
}

/// One scheduled ingestion-and-store cycle. Blocking; no retry.
pub fn run_scheduled_cycle(
    store: &Store,
    provider: &dyn SourceProvider,
    config: &ScheduleConfig,
) -> Result<IngestionOutcome, AppError> {
    tracing::info!("Running scheduled scrape of {}", config.source_key);
    let source = provider.open(&config.source_key)?;
    ingest_and_store(
        store,
        source.as_ref(),
        &IngestionOptions::with_pages(config.pages),
        None,
    )
}

fn next_firing(period: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|period| now.checked_add_signed(period))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_weekly_beijing() {
        let config = ScheduleConfig::default();
        assert_eq!(config.source_key, "bj");
        assert_eq!(config.pages, 5);
        assert_eq!(config.period, WEEKLY);
    }

    #[test]
    fn next_firing_is_one_period_ahead() {
        let before = Utc::now();
        let next = next_firing(Duration::from_secs(3600));
        let delta = next - before;
        assert!(delta >= chrono::Duration::seconds(3599));
        assert!(delta <= chrono::Duration::seconds(3601));
    }

    #[test]
    fn next_firing_saturates_for_huge_periods() {
        assert_eq!(next_firing(Duration::from_secs(u64::MAX / 2)), DateTime::<Utc>::MAX_UTC);
    }
}
