use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::models::{Article, TimeWindow};

/// Where a run's articles come from.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch articles published within the window. May return an empty
    /// list; failures of individual upstream sources must be absorbed
    /// here, not surfaced to the pipeline.
    async fn fetch(&self, window: TimeWindow) -> Result<Vec<Article>>;
}

/// RSS/Atom feed poller.
pub struct RssArticleSource {
    client: Client,
    feeds: Vec<FeedConfig>,
    max_article_chars: usize,
}

impl RssArticleSource {
    pub fn new(feeds: Vec<FeedConfig>, max_article_chars: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; TopicMonitor/1.0)")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            feeds,
            max_article_chars,
        })
    }

    async fn fetch_feed(&self, feed: &FeedConfig, window: TimeWindow) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(&feed.url)
            .send()
            .await
            .with_context(|| format!("Failed to request feed {}", feed.url))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {} from {}", response.status(), feed.url);
        }

        let content = response
            .bytes()
            .await
            .context("Failed to read feed body")?;

        // Try parsing as RSS first, then Atom.
        if let Ok(channel) = rss::Channel::read_from(&content[..]) {
            return Ok(self.collect_rss(&channel, feed, window));
        }

        if let Ok(atom_feed) = atom_syndication::Feed::read_from(&content[..]) {
            return Ok(self.collect_atom(&atom_feed, feed, window));
        }

        anyhow::bail!("Feed is neither valid RSS nor Atom: {}", feed.url)
    }

    fn collect_rss(
        &self,
        channel: &rss::Channel,
        feed: &FeedConfig,
        window: TimeWindow,
    ) -> Vec<Article> {
        channel
            .items()
            .iter()
            .filter_map(|item| {
                let title = item.title()?.to_string();
                let url = item.link()?.to_string();
                let published_at = item.pub_date().and_then(parse_feed_date)?;

                if !window.contains(published_at) {
                    return None;
                }

                let html = item
                    .content()
                    .or_else(|| item.description())
                    .unwrap_or_default();
                let text = self.body_text(html);

                Some(Article::new(title, url, feed.name.clone(), published_at, text))
            })
            .collect()
    }

    fn collect_atom(
        &self,
        atom_feed: &atom_syndication::Feed,
        feed: &FeedConfig,
        window: TimeWindow,
    ) -> Vec<Article> {
        atom_feed
            .entries()
            .iter()
            .filter_map(|entry| {
                let title = entry.title().to_string();
                let url = entry.links().first().map(|l| l.href().to_string())?;
                let published_at = entry
                    .published()
                    .copied()
                    .unwrap_or_else(|| *entry.updated())
                    .with_timezone(&Utc);

                if !window.contains(published_at) {
                    return None;
                }

                let html = entry
                    .content()
                    .and_then(|c| c.value())
                    .or_else(|| entry.summary().map(|s| s.as_str()))
                    .unwrap_or_default();
                let text = self.body_text(html);

                Some(Article::new(title, url, feed.name.clone(), published_at, text))
            })
            .collect()
    }

    /// Convert entry HTML to capped plain text.
    fn body_text(&self, html: &str) -> String {
        let text = html2text::from_read(html.as_bytes(), 100);
        let trimmed = text.trim();
        if trimmed.len() <= self.max_article_chars {
            return trimmed.to_string();
        }
        let mut end = self.max_article_chars;
        while end > 0 && !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    }
}

#[async_trait]
impl ArticleSource for RssArticleSource {
    async fn fetch(&self, window: TimeWindow) -> Result<Vec<Article>> {
        let mut articles: Vec<Article> = Vec::new();
        let mut reachable = 0usize;

        for feed in &self.feeds {
            match self.fetch_feed(feed, window).await {
                Ok(mut items) => {
                    reachable += 1;
                    debug!(feed = %feed.name, count = items.len(), "Fetched feed");
                    articles.append(&mut items);
                }
                Err(e) => {
                    warn!(feed = %feed.name, error = %e, "Skipping unreachable feed");
                }
            }
        }

        // Newest first, deduped by link across feeds.
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let mut seen = std::collections::HashSet::new();
        articles.retain(|article| seen.insert(article.url.clone()));

        info!(
            feeds = self.feeds.len(),
            reachable,
            articles = articles.len(),
            "Feed sweep complete"
        );

        Ok(articles)
    }
}

/// Parse the date formats feeds use in the wild.
fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        })
}
