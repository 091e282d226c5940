use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::ScheduleConfig;
use crate::models::{RunSlot, SelectionResult, TimeWindow};
use crate::pipeline::{Pipeline, PipelineError};

/// Drives the pipeline at the three configured daily slots.
///
/// Slot times are interpreted in the configured timezone. A firing that
/// lands while the previous run is still in flight is skipped and logged;
/// the pipeline's own guard enforces that invariant.
pub struct MonitorScheduler {
    scheduler: JobScheduler,
}

impl MonitorScheduler {
    pub async fn new(
        schedule: &ScheduleConfig,
        lookback_hours: i64,
        pipeline: Arc<Pipeline>,
    ) -> Result<Self> {
        let tz: Tz = schedule.parse_timezone()?;
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create job scheduler: {e}"))?;

        for slot in RunSlot::ALL {
            let (hour, minute) = schedule
                .slot_time(slot)
                .with_context(|| format!("Bad schedule for {slot}"))?;
            let cron = cron_expr(hour, minute);
            let pipeline = pipeline.clone();

            let job = Job::new_async_tz(cron.as_str(), tz, move |_uuid, _lock| {
                let pipeline = pipeline.clone();
                Box::pin(async move {
                    let _ = run_slot(&pipeline, slot, lookback_hours, Utc::now()).await;
                })
            })
            .map_err(|e| anyhow!("Invalid cron '{cron}' for {slot}: {e}"))?;

            scheduler
                .add(job)
                .await
                .map_err(|e| anyhow!("Failed to register {slot} job: {e}"))?;
            info!(%slot, %cron, timezone = %tz.name(), "Scheduled daily run");
        }

        Ok(Self { scheduler })
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {e}"))?;
        info!("Scheduler started, waiting for slot times");
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }
        info!("Scheduler stopped");
    }
}

/// Execute one slot's run. Also the entry point for manual `--run` calls.
pub async fn run_slot(
    pipeline: &Pipeline,
    slot: RunSlot,
    lookback_hours: i64,
    as_of: DateTime<Utc>,
) -> Result<SelectionResult, PipelineError> {
    let run_id = run_id_for(slot, as_of);
    let window = TimeWindow::ending_at(as_of, lookback_hours);

    match pipeline.run(&run_id, slot, window).await {
        Ok(selection) => {
            info!(
                %run_id,
                topics = selection.topics.len(),
                flag = ?selection.flag,
                "Slot run complete"
            );
            Ok(selection)
        }
        Err(PipelineError::RunInFlight) => {
            warn!(%run_id, "Previous run still in flight, skipping this slot");
            Err(PipelineError::RunInFlight)
        }
        Err(e) => {
            error!(%run_id, error = %e, "Slot run failed");
            Err(e)
        }
    }
}

/// One run id per day and slot, so a rerun of the same slot is idempotent
/// at the report layer.
fn run_id_for(slot: RunSlot, as_of: DateTime<Utc>) -> String {
    format!("{}-{}", as_of.format("%Y-%m-%d"), slot)
}

/// Six-field cron (with seconds) for a daily HH:MM firing.
fn cron_expr(hour: u32, minute: u32) -> String {
    format!("0 {minute} {hour} * * *")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::mock::MockTopicModel;
    use crate::models::Article;
    use crate::report::ReportSink;
    use crate::sources::ArticleSource;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct EmptySource;

    #[async_trait]
    impl ArticleSource for EmptySource {
        async fn fetch(&self, _window: TimeWindow) -> Result<Vec<Article>> {
            Ok(Vec::new())
        }
    }

    struct NullSink;

    impl ReportSink for NullSink {
        fn append(
            &self,
            _run_id: &str,
            _slot: RunSlot,
            _as_of: DateTime<Utc>,
            _selection: &SelectionResult,
            _articles: &[Article],
        ) -> Result<()> {
            Ok(())
        }
    }

    fn test_pipeline(data_dir: &std::path::Path) -> Arc<Pipeline> {
        let mut config = MonitorConfig::default();
        config.data_dir = data_dir.to_path_buf();
        Arc::new(Pipeline::new(
            &config,
            Arc::new(MockTopicModel::new()),
            Arc::new(EmptySource),
            Arc::new(NullSink),
        ))
    }

    #[test]
    fn test_cron_expr_format() {
        assert_eq!(cron_expr(9, 30), "0 30 9 * * *");
        assert_eq!(cron_expr(20, 5), "0 5 20 * * *");
    }

    #[test]
    fn test_run_id_is_stable_per_day_and_slot() {
        let as_of = Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap();
        assert_eq!(run_id_for(RunSlot::Morning, as_of), "2026-02-01-morning");
        let later = Utc.with_ymd_and_hms(2026, 2, 1, 9, 45, 0).unwrap();
        assert_eq!(run_id_for(RunSlot::Morning, as_of), run_id_for(RunSlot::Morning, later));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_registers_all_slots() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        let schedule = ScheduleConfig::default();

        let scheduler = MonitorScheduler::new(&schedule, 24, pipeline).await;
        assert!(scheduler.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_rejects_bad_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        let schedule = ScheduleConfig {
            timezone: "Nowhere/Special".to_string(),
            ..Default::default()
        };

        let scheduler = MonitorScheduler::new(&schedule, 24, pipeline).await;
        assert!(scheduler.is_err());
    }

    #[tokio::test]
    async fn test_run_slot_executes_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        let as_of = Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap();

        let selection = run_slot(&pipeline, RunSlot::Morning, 24, as_of)
            .await
            .unwrap();
        assert!(selection.is_skipped());
    }
}
