use crate::config::HeatConfig;
use crate::models::TopicCluster;

/// Computes the 0-100 heat score for merged topics.
///
/// `heat = min(mentions/10 * mention_cap, mention_cap)
///       + avg_depth * depth_scale
///       + category_weight * category_scale`
///
/// Terms are evaluated in that fixed order and summed left to right, so
/// the same inputs always produce the same float.
pub struct HeatScorer {
    config: HeatConfig,
}

impl HeatScorer {
    pub fn new(config: HeatConfig) -> Self {
        Self { config }
    }

    /// Score a single cluster. Pure; the cluster is not modified.
    pub fn score(&self, cluster: &TopicCluster) -> f64 {
        let mention_term = (cluster.mention_count as f64 / 10.0
            * self.config.mention_cap_weight)
            .min(self.config.mention_cap_weight);
        let depth_term = cluster.avg_depth * self.config.depth_weight_scale;
        let category_term =
            self.config.category_weight(cluster.category) * self.config.category_weight_scale;

        let total = mention_term + depth_term + category_term;
        // One decimal place, then clamp into the score range.
        ((total * 10.0).round() / 10.0).clamp(0.0, 100.0)
    }

    /// Produce a scored copy of every cluster.
    pub fn score_all(&self, clusters: Vec<TopicCluster>) -> Vec<TopicCluster> {
        clusters
            .into_iter()
            .map(|mut cluster| {
                cluster.heat_score = self.score(&cluster);
                cluster
            })
            .collect()
    }
}
