use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single article fetched for one monitoring run.
///
/// Articles are immutable once fetched; every later stage produces new
/// collections instead of mutating these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Stable identifier derived from the article link.
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    /// Plain-text body (or feed summary when the feed carries no body).
    pub text: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        published_at: DateTime<Utc>,
        text: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: article_id(&url),
            title: title.into(),
            url,
            source_name: source_name.into(),
            published_at,
            text: text.into(),
        }
    }
}

/// Derive a stable article id from its URL.
///
/// FNV-1a over the link; good enough to dedup within a run and cheap to
/// recompute when reloading snapshots.
pub fn article_id(url: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in url.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

/// Editorial category assigned to a topic by the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Engineering,
    Research,
    Product,
    Industry,
    Community,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Engineering,
        Category::Research,
        Category::Product,
        Category::Industry,
        Category::Community,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Engineering => "engineering",
            Category::Research => "research",
            Category::Product => "product",
            Category::Industry => "industry",
            Category::Community => "community",
        }
    }

    /// Parse a model-reported category label, tolerating case and close
    /// synonyms. Unknown labels fall back to `Industry`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "engineering" | "technical" | "deep dive" | "deep-dive" => Category::Engineering,
            "research" | "paper" | "academic" => Category::Research,
            "product" | "release" | "launch" => Category::Product,
            "industry" | "news" | "business" => Category::Industry,
            "community" | "opinion" | "culture" => Category::Community,
            _ => Category::Industry,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One article's inferred topic, before cross-article merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCandidate {
    pub article_id: String,
    pub label: String,
    /// How substantively the article discusses the topic, in [0,1].
    pub depth: f64,
    pub category: Category,
}

/// A merged topic spanning one or more articles.
///
/// Clusters partition the candidate set: every successful candidate lands
/// in exactly one cluster. `mention_count` always equals the member count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCluster {
    /// Creation-order id; lower means created earlier in the canonical pass.
    pub id: usize,
    pub representative_label: String,
    pub member_article_ids: BTreeSet<String>,
    pub category: Category,
    pub mention_count: usize,
    pub avg_depth: f64,
    /// Composite newsworthiness score in [0,100]; 0.0 until scored.
    pub heat_score: f64,
}

impl TopicCluster {
    pub fn from_candidate(id: usize, candidate: &TopicCandidate) -> Self {
        let mut members = BTreeSet::new();
        members.insert(candidate.article_id.clone());
        Self {
            id,
            representative_label: candidate.label.clone(),
            member_article_ids: members,
            category: candidate.category,
            mention_count: 1,
            avg_depth: candidate.depth,
            heat_score: 0.0,
        }
    }

    /// Fold a candidate into this cluster, keeping the running depth mean.
    pub fn absorb(&mut self, candidate: &TopicCandidate) {
        let n = self.mention_count as f64;
        self.avg_depth = (self.avg_depth * n + candidate.depth) / (n + 1.0);
        self.member_article_ids.insert(candidate.article_id.clone());
        self.mention_count = self.member_article_ids.len();
    }
}

/// Which relaxation rule the selector applied for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationFlag {
    /// Full article volume; strict selection.
    Normal,
    /// Zero articles fetched; the run is skipped.
    NoArticles,
    /// Article volume under the configured floor; acceptance bar relaxed.
    LowArticles,
    /// Fewer clusters than requested topics; all clusters returned.
    LowTopics,
}

/// Terminal artifact of one pipeline run: the picked topics, ordered by
/// heat, plus the degradation state that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub topics: Vec<TopicCluster>,
    pub flag: DegradationFlag,
}

impl SelectionResult {
    pub fn skipped() -> Self {
        Self {
            topics: Vec::new(),
            flag: DegradationFlag::NoArticles,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.flag == DegradationFlag::NoArticles
    }
}

/// The lookback window a run fetches articles for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn ending_at(end: DateTime<Utc>, lookback_hours: i64) -> Self {
        Self {
            start: end - chrono::Duration::hours(lookback_hours),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// The three daily run slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSlot {
    Morning,
    Afternoon,
    Evening,
}

impl RunSlot {
    pub const ALL: [RunSlot; 3] = [RunSlot::Morning, RunSlot::Afternoon, RunSlot::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunSlot::Morning => "morning",
            RunSlot::Afternoon => "afternoon",
            RunSlot::Evening => "evening",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "morning" => Some(RunSlot::Morning),
            "afternoon" => Some(RunSlot::Afternoon),
            "evening" => Some(RunSlot::Evening),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_article_id_stable() {
        let a = article_id("https://example.com/post");
        let b = article_id("https://example.com/post");
        assert_eq!(a, b);
        assert_ne!(a, article_id("https://example.com/other"));
    }

    #[test]
    fn test_category_from_label_known() {
        assert_eq!(Category::from_label("Engineering"), Category::Engineering);
        assert_eq!(Category::from_label("research"), Category::Research);
        assert_eq!(Category::from_label("  Product "), Category::Product);
    }

    #[test]
    fn test_category_from_label_unknown_defaults_to_industry() {
        assert_eq!(Category::from_label("astrology"), Category::Industry);
        assert_eq!(Category::from_label(""), Category::Industry);
    }

    #[test]
    fn test_cluster_absorb_updates_running_mean() {
        let first = TopicCandidate {
            article_id: "a1".to_string(),
            label: "Rust async runtimes".to_string(),
            depth: 0.8,
            category: Category::Engineering,
        };
        let second = TopicCandidate {
            article_id: "a2".to_string(),
            label: "Tokio internals".to_string(),
            depth: 0.4,
            category: Category::Engineering,
        };

        let mut cluster = TopicCluster::from_candidate(0, &first);
        cluster.absorb(&second);

        assert_eq!(cluster.mention_count, 2);
        assert_eq!(cluster.member_article_ids.len(), 2);
        assert!((cluster.avg_depth - 0.6).abs() < 1e-9);
        // Representative label is first-seen.
        assert_eq!(cluster.representative_label, "Rust async runtimes");
    }

    #[test]
    fn test_cluster_absorb_same_article_does_not_double_count() {
        let candidate = TopicCandidate {
            article_id: "a1".to_string(),
            label: "Edge AI".to_string(),
            depth: 0.5,
            category: Category::Industry,
        };
        let mut cluster = TopicCluster::from_candidate(0, &candidate);
        cluster.absorb(&candidate);
        assert_eq!(cluster.mention_count, 1);
    }

    #[test]
    fn test_time_window_contains() {
        let end = Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap();
        let window = TimeWindow::ending_at(end, 24);
        assert!(window.contains(end));
        assert!(window.contains(end - chrono::Duration::hours(24)));
        assert!(!window.contains(end - chrono::Duration::hours(25)));
        assert!(!window.contains(end + chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_run_slot_round_trip() {
        for slot in RunSlot::ALL {
            assert_eq!(RunSlot::parse(slot.as_str()), Some(slot));
        }
        assert_eq!(RunSlot::parse("midnight"), None);
    }
}
