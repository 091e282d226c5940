use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClusteringConfig;
use crate::model::TopicModel;
use crate::models::{TopicCandidate, TopicCluster};

/// Contract violations in the clusterer's input. These indicate an
/// upstream bug, so they are fatal for the run rather than absorbed.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("candidate for article {article_id} has an empty label")]
    InvalidCandidate { article_id: String },
}

/// Merges per-article topic candidates into disjoint clusters by semantic
/// similarity of their labels.
///
/// The pass is greedy and single-threaded: candidates are first sorted by
/// `(category, label, article_id)` so the outcome does not depend on the
/// order extraction results arrived in.
pub struct TopicClusterer {
    model: Arc<dyn TopicModel>,
    config: ClusteringConfig,
    max_retries: u32,
}

impl TopicClusterer {
    pub fn new(model: Arc<dyn TopicModel>, config: ClusteringConfig, max_retries: u32) -> Self {
        Self {
            model,
            config,
            max_retries,
        }
    }

    /// Partition the candidates into clusters.
    ///
    /// Every candidate lands in exactly one cluster; a candidate that
    /// clears the similarity threshold against several clusters joins the
    /// earliest-created one. Representative labels are first-seen.
    pub async fn cluster(
        &self,
        candidates: Vec<TopicCandidate>,
    ) -> Result<Vec<TopicCluster>, ClusterError> {
        for candidate in &candidates {
            if candidate.label.trim().is_empty() {
                return Err(ClusterError::InvalidCandidate {
                    article_id: candidate.article_id.clone(),
                });
            }
        }

        let mut ordered = candidates;
        ordered.sort_by(|a, b| {
            (a.category, &a.label, &a.article_id).cmp(&(b.category, &b.label, &b.article_id))
        });

        let mut clusters: Vec<TopicCluster> = Vec::new();

        for candidate in &ordered {
            let mut best: Option<(usize, f64)> = None;

            for (index, cluster) in clusters.iter().enumerate() {
                if !self.config.allow_cross_category_merge
                    && cluster.category != candidate.category
                {
                    continue;
                }

                let score = self
                    .similarity_with_retry(&cluster.representative_label, &candidate.label)
                    .await;

                if score < self.config.similarity_threshold {
                    continue;
                }

                // Strict greater-than keeps the lowest cluster id on ties;
                // clusters are iterated in creation order.
                match best {
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((index, score)),
                }
            }

            match best {
                Some((index, score)) => {
                    debug!(
                        label = %candidate.label,
                        cluster = %clusters[index].representative_label,
                        score,
                        "Merged candidate into cluster"
                    );
                    clusters[index].absorb(candidate);
                }
                None => {
                    let id = clusters.len();
                    clusters.push(TopicCluster::from_candidate(id, candidate));
                }
            }
        }

        debug!(
            candidates = ordered.len(),
            clusters = clusters.len(),
            "Clustering complete"
        );
        Ok(clusters)
    }

    /// Similarity with the same transient-retry policy extraction uses.
    /// A pair whose calls all fail is treated as dissimilar so the pass
    /// stays total.
    async fn similarity_with_retry(&self, label_a: &str, label_b: &str) -> f64 {
        let attempts = self.max_retries.max(1);
        for attempt in 0..attempts {
            match self.model.similarity(label_a, label_b).await {
                Ok(score) => return score.clamp(0.0, 1.0),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let backoff = std::time::Duration::from_millis(500 * 2_u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        label_a,
                        label_b,
                        error = %e,
                        "Similarity unavailable, treating pair as dissimilar"
                    );
                    return 0.0;
                }
            }
        }
        0.0
    }
}
