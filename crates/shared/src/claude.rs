use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::model::{extract_json, ModelError, TopicModel, TopicSignal};

// Prompt input caps; articles beyond this add cost without adding signal.
const MAX_PROMPT_CHARS: usize = 8000;

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<Content>,
}

#[derive(Deserialize)]
struct Content {
    text: String,
}

#[derive(Deserialize)]
struct TopicJson {
    label: String,
    #[serde(default)]
    depth: Option<f64>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct SimilarityJson {
    similarity: f64,
}

/// `TopicModel` backed by the Anthropic Messages API.
pub struct ClaudeTopicModel {
    client: Client,
    api_key: String,
    config: ModelConfig,
}

impl ClaudeTopicModel {
    pub fn new(api_key: String, config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    async fn call(&self, prompt: String) -> Result<String, ModelError> {
        let request = ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Api(e.to_string()))?;

        if response.status() == 429 {
            return Err(ModelError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("HTTP {status}: {body}")));
        }

        let claude_response = response
            .json::<ClaudeResponse>()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        let text = claude_response
            .content
            .first()
            .map(|c| c.text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        Ok(text)
    }

    fn topic_prompt(title: &str, text: &str) -> String {
        let truncated = truncate_chars(text, MAX_PROMPT_CHARS);
        format!(
            r#"Analyze this article and identify the single dominant topic it discusses.

RULES:
1. The topic label must be specific and informative (5-12 words), naming the
   concrete company/project/event, not a broad theme.
   - Good: "OpenAI releases Codex desktop application"
   - Bad: "AI development" (too generic)
2. depth is how substantively the article discusses that topic, from 0.0
   (passing mention) to 1.0 (thorough analysis).
3. category is one of: engineering, research, product, industry, community.

Title: {title}

Article:
{truncated}

Respond with JSON only, no other text:
{{"label": "specific topic label", "depth": 0.8, "category": "engineering"}}"#
        )
    }

    fn similarity_prompt(label_a: &str, label_b: &str) -> String {
        format!(
            r#"Rate the semantic similarity of these two topic labels from 0.0 to 1.0.

1.0 means they describe the same underlying topic or event.
0.0 means they are unrelated.
Labels about the same field but different events (e.g. two different product
launches) should score below 0.5.

Label A: {label_a}
Label B: {label_b}

Respond with JSON only, no other text:
{{"similarity": 0.85}}"#
        )
    }
}

#[async_trait]
impl TopicModel for ClaudeTopicModel {
    async fn summarize_topic(&self, title: &str, text: &str) -> Result<TopicSignal, ModelError> {
        let response = self.call(Self::topic_prompt(title, text)).await?;
        let parsed: TopicJson = serde_json::from_str(&extract_json(&response))
            .map_err(|e| ModelError::Parse(format!("topic JSON: {e}")))?;

        if parsed.label.trim().is_empty() {
            return Err(ModelError::Parse("empty topic label".to_string()));
        }

        Ok(TopicSignal {
            label: parsed.label.trim().to_string(),
            depth: parsed.depth,
            category: parsed.category,
        })
    }

    async fn similarity(&self, label_a: &str, label_b: &str) -> Result<f64, ModelError> {
        let response = self.call(Self::similarity_prompt(label_a, label_b)).await?;
        let parsed: SimilarityJson = serde_json::from_str(&extract_json(&response))
            .map_err(|e| ModelError::Parse(format!("similarity JSON: {e}")))?;

        if !(0.0..=1.0).contains(&parsed.similarity) {
            return Err(ModelError::Parse(format!(
                "similarity out of range: {}",
                parsed.similarity
            )));
        }

        Ok(parsed.similarity)
    }
}

/// Truncate to a char budget, respecting UTF-8 boundaries.
fn truncate_chars(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "héllo wörld".repeat(100);
        let cut = truncate_chars(&text, 500);
        assert!(cut.len() <= 500);
        // Must still be valid UTF-8 slicing.
        assert!(text.starts_with(cut));
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_topic_prompt_mentions_categories() {
        let prompt = ClaudeTopicModel::topic_prompt("A title", "Some body");
        assert!(prompt.contains("engineering, research, product, industry, community"));
        assert!(prompt.contains("A title"));
    }

    #[test]
    fn test_topic_json_optional_fields() {
        let parsed: TopicJson = serde_json::from_str(r#"{"label": "X"}"#).unwrap();
        assert_eq!(parsed.label, "X");
        assert!(parsed.depth.is_none());
        assert!(parsed.category.is_none());
    }
}
