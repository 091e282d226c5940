use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::clustering::{ClusterError, TopicClusterer};
use crate::config::MonitorConfig;
use crate::extractor::TopicExtractor;
use crate::heat::HeatScorer;
use crate::io::RunStore;
use crate::model::TopicModel;
use crate::models::{RunSlot, SelectionResult, TimeWindow};
use crate::report::ReportSink;
use crate::selector::Selector;
use crate::sources::ArticleSource;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A second run was requested while one is still in flight. The caller
    /// should skip and try again at the next scheduled slot.
    #[error("a run is already in flight")]
    RunInFlight,

    #[error("article source failed: {0}")]
    Source(String),

    #[error(transparent)]
    Clustering(#[from] ClusterError),

    #[error("report sink failed: {0}")]
    Report(String),
}

/// Orchestrates one scheduled run: fetch, extract, cluster, score, select,
/// report. Stages run strictly forward; only extraction fans out, and it
/// is joined before clustering starts.
///
/// Runs are all-or-nothing: dropping the `run` future (shutdown) discards
/// any partial extraction work without emitting a result.
pub struct Pipeline {
    source: Arc<dyn ArticleSource>,
    extractor: TopicExtractor,
    clusterer: TopicClusterer,
    scorer: HeatScorer,
    selector: Selector,
    sink: Arc<dyn ReportSink>,
    store: RunStore,
    run_in_flight: AtomicBool,
}

impl Pipeline {
    pub fn new(
        config: &MonitorConfig,
        model: Arc<dyn TopicModel>,
        source: Arc<dyn ArticleSource>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            source,
            extractor: TopicExtractor::new(model.clone(), config.extraction.clone()),
            clusterer: TopicClusterer::new(
                model,
                config.clustering.clone(),
                config.extraction.max_retries,
            ),
            scorer: HeatScorer::new(config.heat.clone()),
            selector: Selector::new(config.selection.clone()),
            sink,
            store: RunStore::new(config.data_dir.clone()),
            run_in_flight: AtomicBool::new(false),
        }
    }

    /// Execute one run. The sole entry point for the scheduler/CLI layer.
    pub async fn run(
        &self,
        run_id: &str,
        slot: RunSlot,
        window: TimeWindow,
    ) -> Result<SelectionResult, PipelineError> {
        let _guard = RunGuard::try_acquire(&self.run_in_flight)
            .ok_or(PipelineError::RunInFlight)?;

        info!(run_id, %slot, start = %window.start, end = %window.end, "Run started");

        let articles = self
            .source
            .fetch(window)
            .await
            .map_err(|e| PipelineError::Source(e.to_string()))?;
        info!(run_id, articles = articles.len(), "Fetched articles");

        if let Err(e) = self.store.save_articles(&articles, window, window.end) {
            warn!(run_id, error = %e, "Could not snapshot raw articles");
        }

        let (candidates, failures) = self.extractor.extract_all(&articles).await;
        info!(
            run_id,
            candidates = candidates.len(),
            dropped = failures.len(),
            "Extraction complete"
        );

        let clusters = self.clusterer.cluster(candidates).await?;
        let scored = self.scorer.score_all(clusters);
        info!(run_id, clusters = scored.len(), "Clustering and scoring complete");

        if let Err(e) = self.store.save_topics(slot, &scored, window.end) {
            warn!(run_id, error = %e, "Could not snapshot scored topics");
        }

        let selection = self.selector.select(scored, articles.len());
        info!(
            run_id,
            topics = selection.topics.len(),
            flag = ?selection.flag,
            "Selection complete"
        );

        self.sink
            .append(run_id, slot, window.end, &selection, &articles)
            .map_err(|e| PipelineError::Report(e.to_string()))?;

        info!(run_id, "Run finished");
        Ok(selection)
    }
}

/// RAII guard enforcing the single-run-at-a-time invariant. The flag is
/// cleared on drop, so a panicking run does not wedge the pipeline.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
