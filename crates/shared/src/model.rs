use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for language-model calls.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse model response: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Invalid model configuration: {0}")]
    Config(String),
}

impl ModelError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Api(_) | ModelError::RateLimited | ModelError::Parse(_)
        )
    }
}

/// What the model reports for one article: a topic label, how deeply the
/// article discusses it, and an editorial category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSignal {
    pub label: String,
    /// Depth signal in [0,1]; `None` when the model omitted it.
    pub depth: Option<f64>,
    pub category: Option<String>,
}

/// The external text-understanding capability the pipeline consumes.
///
/// Implementations must be safe to share across the extraction fan-out.
#[async_trait]
pub trait TopicModel: Send + Sync {
    /// Infer the single dominant topic of an article.
    async fn summarize_topic(&self, title: &str, text: &str) -> Result<TopicSignal, ModelError>;

    /// Semantic similarity of two topic labels, in [0,1].
    async fn similarity(&self, label_a: &str, label_b: &str) -> Result<f64, ModelError>;
}

/// Extract a JSON object from model output (handles markdown code fences
/// and leading prose).
pub(crate) fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            return text[start + 3..start + 3 + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        return text[start..=end].to_string();
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"label": "Edge AI", "depth": 0.5}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_code_block() {
        let text = "Here you go:\n```json\n{\"label\": \"Edge AI\"}\n```";
        let json = extract_json(text);
        assert!(json.starts_with('{'));
        assert!(json.contains("Edge AI"));
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let text = r#"Sure! {"label": "Edge AI", "depth": 0.5} hope that helps"#;
        let json = extract_json(text);
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::RateLimited.is_transient());
        assert!(ModelError::Api("503".to_string()).is_transient());
        assert!(ModelError::Parse("bad json".to_string()).is_transient());
        assert!(!ModelError::EmptyResponse.is_transient());
        assert!(!ModelError::Config("no key".to_string()).is_transient());
    }
}
