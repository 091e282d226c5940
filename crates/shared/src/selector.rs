use std::cmp::Ordering;

use tracing::{debug, info};

use crate::config::SelectionConfig;
use crate::models::{DegradationFlag, SelectionResult, TopicCluster};

/// Ranks scored clusters and applies the degradation rules for
/// low-volume runs. Total: every input produces a `SelectionResult`.
pub struct Selector {
    config: SelectionConfig,
}

impl Selector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Pick the topics to report.
    ///
    /// Degradation states are mutually exclusive and checked in priority
    /// order: NoArticles, LowArticles, LowTopics, Normal.
    pub fn select(
        &self,
        clusters: Vec<TopicCluster>,
        total_article_count: usize,
    ) -> SelectionResult {
        if total_article_count == 0 {
            info!("No articles this run, skipping selection");
            return SelectionResult::skipped();
        }

        let mut ranked = clusters;
        ranked.sort_by(compare_clusters);

        if total_article_count < self.config.low_article_floor {
            // Thin run: keep whatever we have, no heat bar.
            let topics: Vec<TopicCluster> = ranked
                .into_iter()
                .take(self.config.topics_per_report)
                .collect();
            debug!(topics = topics.len(), "Low article volume, relaxed selection");
            return SelectionResult {
                topics,
                flag: DegradationFlag::LowArticles,
            };
        }

        if ranked.len() < self.config.topics_per_report {
            debug!(topics = ranked.len(), "Fewer clusters than requested, returning all");
            return SelectionResult {
                topics: ranked,
                flag: DegradationFlag::LowTopics,
            };
        }

        let topics: Vec<TopicCluster> = ranked
            .into_iter()
            .filter(|c| c.heat_score >= self.config.min_heat_threshold)
            .take(self.config.topics_per_report)
            .collect();

        SelectionResult {
            topics,
            flag: DegradationFlag::Normal,
        }
    }
}

/// Heat descending, then mention count descending, then cluster id
/// ascending. The id tie-break keeps equal runs byte-identical.
fn compare_clusters(a: &TopicCluster, b: &TopicCluster) -> Ordering {
    b.heat_score
        .partial_cmp(&a.heat_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.mention_count.cmp(&a.mention_count))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, TopicCandidate};

    fn cluster(id: usize, mentions: usize, heat: f64) -> TopicCluster {
        let seed = TopicCandidate {
            article_id: format!("c{id}-a0"),
            label: format!("topic {id}"),
            depth: 0.5,
            category: Category::Industry,
        };
        let mut cluster = TopicCluster::from_candidate(id, &seed);
        for i in 1..mentions {
            cluster.absorb(&TopicCandidate {
                article_id: format!("c{id}-a{i}"),
                label: format!("topic {id}"),
                depth: 0.5,
                category: Category::Industry,
            });
        }
        cluster.heat_score = heat;
        cluster
    }

    fn selector(topics_per_report: usize, floor: usize, min_heat: f64) -> Selector {
        Selector::new(SelectionConfig {
            topics_per_report,
            articles_per_topic: 5,
            low_article_floor: floor,
            min_heat_threshold: min_heat,
        })
    }

    #[test]
    fn test_no_articles_skips() {
        let result = selector(3, 5, 0.0).select(vec![cluster(0, 2, 50.0)], 0);
        assert!(result.topics.is_empty());
        assert_eq!(result.flag, DegradationFlag::NoArticles);
        assert!(result.is_skipped());
    }

    #[test]
    fn test_low_articles_takes_priority_over_low_topics() {
        // 3 articles (< floor 5) and 2 clusters (< 3 requested): the
        // article floor wins and both clusters come back.
        let result = selector(3, 5, 0.0).select(vec![cluster(0, 2, 50.0), cluster(1, 1, 30.0)], 3);
        assert_eq!(result.flag, DegradationFlag::LowArticles);
        assert_eq!(result.topics.len(), 2);
    }

    #[test]
    fn test_low_articles_ignores_heat_bar() {
        let result =
            selector(3, 5, 45.0).select(vec![cluster(0, 2, 50.0), cluster(1, 1, 10.0)], 3);
        assert_eq!(result.flag, DegradationFlag::LowArticles);
        // The 10.0 cluster survives despite the 45.0 bar.
        assert_eq!(result.topics.len(), 2);
    }

    #[test]
    fn test_low_topics_returns_all_clusters() {
        // The reference scenario: 12 articles, clusters at 62.5 and 40.0,
        // three topics requested.
        let result = selector(3, 5, 0.0).select(vec![cluster(0, 5, 62.5), cluster(1, 3, 40.0)], 12);
        assert_eq!(result.flag, DegradationFlag::LowTopics);
        assert_eq!(result.topics.len(), 2);
        assert!((result.topics[0].heat_score - 62.5).abs() < 1e-9);
        assert!((result.topics[1].heat_score - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_normal_returns_exactly_requested() {
        let clusters = vec![
            cluster(0, 2, 40.0),
            cluster(1, 6, 80.0),
            cluster(2, 3, 55.0),
            cluster(3, 1, 20.0),
        ];
        let result = selector(3, 5, 0.0).select(clusters, 12);
        assert_eq!(result.flag, DegradationFlag::Normal);
        assert_eq!(result.topics.len(), 3);
        let heats: Vec<f64> = result.topics.iter().map(|t| t.heat_score).collect();
        assert_eq!(heats, vec![80.0, 55.0, 40.0]);
    }

    #[test]
    fn test_normal_applies_heat_bar() {
        let clusters = vec![
            cluster(0, 5, 62.5),
            cluster(1, 3, 40.0),
            cluster(2, 2, 30.0),
        ];
        let result = selector(3, 5, 50.0).select(clusters, 12);
        assert_eq!(result.flag, DegradationFlag::Normal);
        assert_eq!(result.topics.len(), 1);
        assert!((result.topics[0].heat_score - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_tie_breaks_mentions_then_id() {
        let clusters = vec![
            cluster(2, 2, 50.0),
            cluster(0, 2, 50.0),
            cluster(1, 4, 50.0),
        ];
        let result = selector(3, 5, 0.0).select(clusters, 12);
        // Same heat: more mentions first, then lower id.
        let ids: Vec<usize> = result.topics.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn test_total_on_empty_cluster_set() {
        let result = selector(3, 5, 0.0).select(Vec::new(), 3);
        assert_eq!(result.flag, DegradationFlag::LowArticles);
        assert!(result.topics.is_empty());
    }
}
