//! Deterministic offline `TopicModel` for tests and dry runs.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::model::{ModelError, TopicModel, TopicSignal};

/// Mock model that derives topics and similarities from the input text
/// alone, with no network access.
///
/// Depth comes from text length (saturating at 4000 chars); similarity is
/// token overlap between labels. Both are stable across runs, which keeps
/// pipeline tests reproducible.
pub struct MockTopicModel {
    /// Number of leading `summarize_topic` calls that fail transiently.
    flaky_calls: AtomicU32,
    category: String,
}

impl MockTopicModel {
    pub fn new() -> Self {
        Self {
            flaky_calls: AtomicU32::new(0),
            category: "industry".to_string(),
        }
    }

    /// Fail the first `n` summarize calls with a transient error, then
    /// behave normally. Used to exercise the extractor's retry path.
    pub fn with_flaky_calls(n: u32) -> Self {
        Self {
            flaky_calls: AtomicU32::new(n),
            category: "industry".to_string(),
        }
    }

    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            flaky_calls: AtomicU32::new(0),
            category: category.into(),
        }
    }
}

impl Default for MockTopicModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicModel for MockTopicModel {
    async fn summarize_topic(&self, title: &str, text: &str) -> Result<TopicSignal, ModelError> {
        let remaining = self.flaky_calls.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .flaky_calls
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(ModelError::Api("scripted transient failure".to_string()));
        }

        if title.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        // Length-derived depth: 4000 chars of body is "thorough".
        let depth = (text.len() as f64 / 4000.0).min(1.0);

        Ok(TopicSignal {
            label: title.trim().to_string(),
            depth: Some(depth),
            category: Some(self.category.clone()),
        })
    }

    async fn similarity(&self, label_a: &str, label_b: &str) -> Result<f64, ModelError> {
        Ok(token_overlap(label_a, label_b))
    }
}

/// Jaccard overlap of lowercase word sets. Identical labels score 1.0,
/// disjoint ones 0.0.
fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<String> = tokens(a);
    let set_b: BTreeSet<String> = tokens(b);

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn tokens(label: &str) -> BTreeSet<String> {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
