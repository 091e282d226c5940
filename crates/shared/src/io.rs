use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Article, RunSlot, TimeWindow, TopicCluster};

/// JSON snapshot of a run's fetched articles.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleSnapshot {
    pub fetch_time: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_articles: usize,
    pub articles: Vec<Article>,
}

/// JSON snapshot of a run's scored clusters, ranked as reported.
#[derive(Debug, Serialize, Deserialize)]
pub struct TopicsSnapshot {
    pub slot: RunSlot,
    pub generated_at: DateTime<Utc>,
    pub total_topics: usize,
    pub clusters: Vec<TopicCluster>,
}

/// Writes per-run diagnostic snapshots under the data directory:
/// `raw/<date>/articles_<HHMM>.json` and
/// `processed/<date>/topics_<slot>.json`.
pub struct RunStore {
    data_dir: PathBuf,
}

impl RunStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn save_articles(
        &self,
        articles: &[Article],
        window: TimeWindow,
        as_of: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let date_dir = self.data_dir.join("raw").join(as_of.format("%Y-%m-%d").to_string());
        let path = date_dir.join(format!("articles_{}.json", as_of.format("%H%M")));

        let snapshot = ArticleSnapshot {
            fetch_time: as_of,
            window_start: window.start,
            window_end: window.end,
            total_articles: articles.len(),
            articles: articles.to_vec(),
        };

        write_json(&date_dir, &path, &snapshot)?;
        Ok(path)
    }

    pub fn save_topics(
        &self,
        slot: RunSlot,
        clusters: &[TopicCluster],
        as_of: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let date_dir = self
            .data_dir
            .join("processed")
            .join(as_of.format("%Y-%m-%d").to_string());
        let path = date_dir.join(format!("topics_{slot}.json"));

        let snapshot = TopicsSnapshot {
            slot,
            generated_at: as_of,
            total_topics: clusters.len(),
            clusters: clusters.to_vec(),
        };

        write_json(&date_dir, &path, &snapshot)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create snapshot dir: {}", dir.display()))?;
    let json = serde_json::to_string_pretty(value).context("Failed to serialize snapshot")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, TopicCandidate};
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_article_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let articles = vec![Article::new(
            "A title",
            "https://example.com/a",
            "Feed",
            as_of(),
            "body",
        )];
        let window = TimeWindow::ending_at(as_of(), 24);

        let path = store.save_articles(&articles, window, as_of()).unwrap();
        assert!(path.ends_with("raw/2026-02-01/articles_0930.json"));

        let raw = fs::read_to_string(&path).unwrap();
        let snapshot: ArticleSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.total_articles, 1);
        assert_eq!(snapshot.articles[0].title, "A title");
        assert_eq!(snapshot.window_end, as_of());
    }

    #[test]
    fn test_topics_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let seed = TopicCandidate {
            article_id: "a1".to_string(),
            label: "Edge AI".to_string(),
            depth: 0.5,
            category: Category::Industry,
        };
        let clusters = vec![TopicCluster::from_candidate(0, &seed)];

        let path = store
            .save_topics(RunSlot::Morning, &clusters, as_of())
            .unwrap();
        assert!(path.ends_with("processed/2026-02-01/topics_morning.json"));

        let raw = fs::read_to_string(&path).unwrap();
        let snapshot: TopicsSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.slot, RunSlot::Morning);
        assert_eq!(snapshot.clusters.len(), 1);
        assert_eq!(snapshot.clusters[0].representative_label, "Edge AI");
    }
}
