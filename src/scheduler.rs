//! Fixed-interval execution of the ingestion and maintenance jobs. Every
//! run, scheduled or manual, is wrapped identically: timed, logged to the
//! execution log, and isolated so one job's failure never disturbs
//! another's schedule.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::ingest::IngestEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    FullIngest,
    QuickUpdate,
    Stats,
    Cleanup,
}

impl Job {
    pub const ALL: [Job; 4] = [Job::FullIngest, Job::QuickUpdate, Job::Stats, Job::Cleanup];

    pub fn name(&self) -> &'static str {
        match self {
            Job::FullIngest => "full-ingest",
            Job::QuickUpdate => "quick-update",
            Job::Stats => "stats",
            Job::Cleanup => "cleanup",
        }
    }

    pub fn parse(name: &str) -> Result<Job> {
        Job::ALL
            .into_iter()
            .find(|job| job.name() == name)
            .ok_or_else(|| AppError::UnknownJob(name.to_string()))
    }
}

#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<IngestEngine>,
    repo: Arc<Repository>,
    config: Config,
}

impl Scheduler {
    pub fn new(engine: Arc<IngestEngine>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            engine,
            repo,
            config,
        }
    }

    /// Run one job to completion and append one execution-log row. Manual
    /// and scheduled invocations share this path, so their logged outcomes
    /// are identical.
    pub async fn run_job(&self, job: Job) -> Result<i64> {
        let started_at = Utc::now();
        let timer = Instant::now();
        tracing::info!("Starting {} job", job.name());

        let result = match job {
            Job::FullIngest => self
                .engine
                .full_ingest()
                .await
                .map(|summary| summary.total_articles as i64),
            Job::QuickUpdate => self
                .engine
                .quick_update()
                .await
                .map(|summary| summary.total_articles as i64),
            Job::Stats => self.engine.refresh_stats().await.map(|n| n as i64),
            Job::Cleanup => self.engine.cleanup().await.map(|n| n as i64),
        };

        let duration_ms = timer.elapsed().as_millis() as i64;
        let log_result = match &result {
            Ok(items) => {
                tracing::info!(
                    "{} job completed: {} items in {}ms",
                    job.name(),
                    items,
                    duration_ms
                );
                self.repo
                    .insert_execution_log(job.name(), "success", started_at, duration_ms, *items, None)
                    .await
            }
            Err(e) => {
                tracing::error!("{} job failed: {}", job.name(), e);
                self.repo
                    .insert_execution_log(
                        job.name(),
                        "error",
                        started_at,
                        duration_ms,
                        0,
                        Some(e.to_string()),
                    )
                    .await
            }
        };
        // Observability must not take the job down with it
        if let Err(e) = log_result {
            tracing::error!("Failed to record execution log: {}", e);
        }

        result
    }

    /// Start every job on its own interval and block until SIGINT/SIGTERM.
    pub async fn run_forever(&self) -> Result<()> {
        self.spawn_interval_job(
            Job::FullIngest,
            Duration::from_secs(self.config.full_ingest_minutes * 60),
        );
        self.spawn_interval_job(
            Job::QuickUpdate,
            Duration::from_secs(self.config.quick_update_minutes * 60),
        );
        self.spawn_interval_job(
            Job::Stats,
            Duration::from_secs(self.config.stats_minutes * 60),
        );
        self.spawn_daily_job(Job::Cleanup, self.config.cleanup_hour_utc);

        tracing::info!(
            "All jobs scheduled: full ingest every {}m, quick update every {}m, stats every {}m, cleanup daily at {:02}:00 UTC",
            self.config.full_ingest_minutes,
            self.config.quick_update_minutes,
            self.config.stats_minutes,
            self.config.cleanup_hour_utc,
        );

        shutdown_signal().await;
        tracing::info!("Received shutdown signal, stopping scheduler");
        Ok(())
    }

    fn spawn_interval_job(&self, job: Job, period: Duration) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                // A failed run is already logged; the schedule keeps going
                let _ = scheduler.run_job(job).await;
            }
        });
    }

    fn spawn_daily_job(&self, job: Job, hour_utc: u32) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_next_hour(hour_utc)).await;
                let _ = scheduler.run_job(job).await;
            }
        });
    }
}

/// Time until the next occurrence of `hour_utc:00`.
fn until_next_hour(hour_utc: u32) -> Duration {
    let now = Utc::now();
    let mut next = now
        .date_naive()
        .and_hms_opt(hour_utc % 24, 0, 0)
        .expect("valid wall-clock hour")
        .and_utc();
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageResolver, Placeholder};

    async fn test_scheduler() -> (tempfile::TempDir, Arc<Repository>, Scheduler) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let repo = Arc::new(Repository::new(db_path.to_str().unwrap()).await.unwrap());
        let images = ImageResolver::with_strategies(repo.clone(), vec![Box::new(Placeholder)]);
        let engine = Arc::new(IngestEngine::with_parts(repo.clone(), images, None));
        let config = Config {
            db_path: db_path.to_string_lossy().to_string(),
            ..Config::default()
        };
        (dir, repo.clone(), Scheduler::new(engine, repo, config))
    }

    #[test]
    fn job_names_round_trip() {
        for job in Job::ALL {
            assert_eq!(Job::parse(job.name()).unwrap(), job);
        }
        assert!(matches!(
            Job::parse("defrag"),
            Err(AppError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn run_job_records_success_in_execution_log() {
        let (_dir, repo, scheduler) = test_scheduler().await;

        let items = scheduler.run_job(Job::Stats).await.unwrap();
        assert_eq!(items, 8);

        let logs = repo.recent_execution_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].job_name, "stats");
        assert_eq!(logs[0].status, "success");
        assert_eq!(logs[0].items_processed, 8);
        assert!(logs[0].error_message.is_none());
    }

    #[tokio::test]
    async fn cleanup_job_runs_and_logs_like_any_other() {
        let (_dir, repo, scheduler) = test_scheduler().await;

        let purged = scheduler.run_job(Job::Cleanup).await.unwrap();
        assert_eq!(purged, 0);

        let logs = repo.recent_execution_logs(10).await.unwrap();
        assert_eq!(logs[0].job_name, "cleanup");
        assert_eq!(logs[0].status, "success");
    }

    #[test]
    fn until_next_hour_is_under_a_day() {
        let wait = until_next_hour(3);
        assert!(wait <= Duration::from_secs(24 * 60 * 60));
        assert!(wait > Duration::ZERO);
    }
}
