use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::model::TopicModel;
use crate::models::{Article, Category, TopicCandidate};

/// Why an article produced no topic candidate.
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("article has no text content")]
    EmptyContent,

    #[error("retries exhausted: {0}")]
    Exhausted(String),

    #[error("permanent model failure: {0}")]
    Permanent(String),
}

/// Per-article extraction failure. Never fatal to a run; the article is
/// simply excluded.
#[derive(Debug)]
pub struct ExtractionFailure {
    pub article_id: String,
    pub reason: FailureReason,
}

/// Calls the language model once per article to infer its topic.
pub struct TopicExtractor {
    model: Arc<dyn TopicModel>,
    config: ExtractionConfig,
    semaphore: Arc<Semaphore>,
}

impl TopicExtractor {
    pub fn new(model: Arc<dyn TopicModel>, config: ExtractionConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
        Self {
            model,
            config,
            semaphore,
        }
    }

    /// Extract a topic candidate from one article.
    ///
    /// Empty articles fail immediately without a model call. Transient
    /// model failures are retried with exponential backoff; exhausting the
    /// budget, or any permanent failure, drops the article from the run.
    pub async fn extract(&self, article: &Article) -> Result<TopicCandidate, ExtractionFailure> {
        if article.text.trim().is_empty() {
            return Err(ExtractionFailure {
                article_id: article.id.clone(),
                reason: FailureReason::EmptyContent,
            });
        }

        let _permit = self.semaphore.acquire().await.map_err(|e| ExtractionFailure {
            article_id: article.id.clone(),
            reason: FailureReason::Permanent(e.to_string()),
        })?;

        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.model.summarize_topic(&article.title, &article.text).await {
                Ok(signal) => {
                    let depth = signal
                        .depth
                        .unwrap_or(self.config.default_depth)
                        .clamp(0.0, 1.0);
                    let category = signal
                        .category
                        .as_deref()
                        .map(Category::from_label)
                        .unwrap_or(Category::Industry);

                    debug!(article = %article.id, label = %signal.label, "Extracted topic");
                    return Ok(TopicCandidate {
                        article_id: article.id.clone(),
                        label: signal.label,
                        depth,
                        category,
                    });
                }
                Err(e) if e.is_transient() => {
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        let backoff =
                            std::time::Duration::from_millis(500 * 2_u64.pow(attempt));
                        debug!(
                            article = %article.id,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis(),
                            "Transient model failure, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => {
                    return Err(ExtractionFailure {
                        article_id: article.id.clone(),
                        reason: FailureReason::Permanent(e.to_string()),
                    });
                }
            }
        }

        Err(ExtractionFailure {
            article_id: article.id.clone(),
            reason: FailureReason::Exhausted(last_error),
        })
    }

    /// Run extraction over all articles with bounded concurrency, joining
    /// before returning. Failures are collected, not propagated.
    pub async fn extract_all(
        &self,
        articles: &[Article],
    ) -> (Vec<TopicCandidate>, Vec<ExtractionFailure>) {
        let futures: Vec<_> = articles.iter().map(|article| self.extract(article)).collect();
        let results: Vec<Result<TopicCandidate, ExtractionFailure>> = stream::iter(futures)
            .buffer_unordered(self.config.concurrency_limit.max(1))
            .collect()
            .await;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(candidate) => candidates.push(candidate),
                Err(failure) => {
                    warn!(
                        article = %failure.article_id,
                        reason = %failure.reason,
                        "Article dropped from run"
                    );
                    failures.push(failure);
                }
            }
        }

        (candidates, failures)
    }
}
