use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{Article, RunSlot, SelectionResult, TopicCluster};

/// Where selected topics end up. The daily report file is append-only and
/// shared across the day's runs; appends must be idempotent per run id.
pub trait ReportSink: Send + Sync {
    fn append(
        &self,
        run_id: &str,
        slot: RunSlot,
        as_of: DateTime<Utc>,
        selection: &SelectionResult,
        articles: &[Article],
    ) -> Result<()>;
}

/// Renders one Markdown section per run into `reports/<date>.md`.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so concurrent readers never observe a torn report.
pub struct MarkdownReportSink {
    reports_dir: PathBuf,
    articles_per_topic: usize,
}

impl MarkdownReportSink {
    pub fn new(reports_dir: impl Into<PathBuf>, articles_per_topic: usize) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            articles_per_topic,
        }
    }

    fn report_path(&self, as_of: DateTime<Utc>) -> PathBuf {
        self.reports_dir
            .join(format!("{}.md", as_of.format("%Y-%m-%d")))
    }

    fn render_section(
        &self,
        run_id: &str,
        slot: RunSlot,
        as_of: DateTime<Utc>,
        selection: &SelectionResult,
        articles: &[Article],
    ) -> String {
        let mut section = String::new();

        section.push_str(&format!(
            "## {} report ({} update)\n{}\n\n",
            capitalize(slot.as_str()),
            as_of.format("%H:%M"),
            run_marker(run_id)
        ));
        section.push_str(&format!(
            "> {} new article(s) in the lookback window\n\n",
            articles.len()
        ));

        if selection.is_skipped() {
            section.push_str("_No articles were fetched in this window; run skipped._\n\n");
            return section;
        }

        if selection.topics.is_empty() {
            section.push_str("_No topics cleared the selection bar this run._\n\n");
            return section;
        }

        let by_id: HashMap<&str, &Article> =
            articles.iter().map(|a| (a.id.as_str(), a)).collect();

        for (rank, topic) in selection.topics.iter().enumerate() {
            section.push_str(&self.render_topic(rank + 1, topic, &by_id));
        }

        section
    }

    fn render_topic(
        &self,
        rank: usize,
        topic: &TopicCluster,
        by_id: &HashMap<&str, &Article>,
    ) -> String {
        let mut block = format!(
            "### {}. {} [heat {:.1}/100]\n\n",
            rank,
            escape_markdown(&topic.representative_label),
            topic.heat_score
        );
        block.push_str(&format!(
            "**Category**: {} | **Mentions**: {} | **Depth**: {}\n\n",
            topic.category,
            topic.mention_count,
            depth_stars(topic.avg_depth)
        ));

        // Newest member articles first, capped for readability.
        let mut members: Vec<&Article> = topic
            .member_article_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();
        members.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        for article in members.iter().take(self.articles_per_topic) {
            block.push_str(&format!(
                "- [{}]({}) — {}, {}\n",
                escape_markdown(&article.title),
                article.url,
                article.source_name,
                article.published_at.format("%Y-%m-%d %H:%M")
            ));
        }
        block.push('\n');
        block
    }
}

impl ReportSink for MarkdownReportSink {
    fn append(
        &self,
        run_id: &str,
        slot: RunSlot,
        as_of: DateTime<Utc>,
        selection: &SelectionResult,
        articles: &[Article],
    ) -> Result<()> {
        fs::create_dir_all(&self.reports_dir).with_context(|| {
            format!("Failed to create reports dir: {}", self.reports_dir.display())
        })?;

        let path = self.report_path(as_of);
        let existing = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                format!("# Topic Monitor — {}\n\n---\n\n", as_of.format("%Y-%m-%d"))
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read report: {}", path.display()))
            }
        };

        if existing.contains(&run_marker(run_id)) {
            debug!(run_id, "Report section already written, skipping append");
            return Ok(());
        }

        let section = self.render_section(run_id, slot, as_of, selection, articles);
        let updated = format!("{existing}{section}---\n\n");

        atomic_write(&self.reports_dir, &path, &updated)?;
        info!(report = %path.display(), run_id, "Report section appended");
        Ok(())
    }
}

fn run_marker(run_id: &str) -> String {
    format!("<!-- run: {run_id} -->")
}

/// Five-star depth gauge, matching the report's editorial style.
fn depth_stars(depth: f64) -> String {
    let filled = (depth.clamp(0.0, 1.0) * 5.0) as usize;
    "★".repeat(filled) + &"☆".repeat(5 - filled)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn escape_markdown(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// Write-then-rename so readers never see a partial report.
fn atomic_write(dir: &Path, path: &Path, content: &str) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .context("Failed to write report content")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, DegradationFlag, TopicCandidate};
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap()
    }

    fn article(n: usize) -> Article {
        Article::new(
            format!("Article {n}"),
            format!("https://example.com/{n}"),
            "Feed",
            as_of() - chrono::Duration::hours(n as i64),
            "body",
        )
    }

    fn selection(articles: &[Article]) -> SelectionResult {
        let seed = TopicCandidate {
            article_id: articles[0].id.clone(),
            label: "Edge AI accelerators".to_string(),
            depth: 0.8,
            category: Category::Engineering,
        };
        let mut cluster = TopicCluster::from_candidate(0, &seed);
        for a in &articles[1..] {
            cluster.absorb(&TopicCandidate {
                article_id: a.id.clone(),
                label: "Edge AI accelerators".to_string(),
                depth: 0.6,
                category: Category::Engineering,
            });
        }
        cluster.heat_score = 62.5;
        SelectionResult {
            topics: vec![cluster],
            flag: DegradationFlag::LowTopics,
        }
    }

    #[test]
    fn test_append_creates_daily_report() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownReportSink::new(dir.path(), 5);
        let articles = vec![article(1), article(2)];

        sink.append("run-1", RunSlot::Morning, as_of(), &selection(&articles), &articles)
            .unwrap();

        let content = fs::read_to_string(dir.path().join("2026-02-01.md")).unwrap();
        assert!(content.contains("# Topic Monitor — 2026-02-01"));
        assert!(content.contains("## Morning report (09:30 update)"));
        assert!(content.contains("Edge AI accelerators"));
        assert!(content.contains("heat 62.5/100"));
        assert!(content.contains("https://example.com/1"));
    }

    #[test]
    fn test_append_is_idempotent_per_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownReportSink::new(dir.path(), 5);
        let articles = vec![article(1)];
        let result = selection(&articles);

        sink.append("run-1", RunSlot::Morning, as_of(), &result, &articles)
            .unwrap();
        sink.append("run-1", RunSlot::Morning, as_of(), &result, &articles)
            .unwrap();

        let content = fs::read_to_string(dir.path().join("2026-02-01.md")).unwrap();
        assert_eq!(content.matches("Edge AI accelerators").count(), 1);
    }

    #[test]
    fn test_later_runs_append_after_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownReportSink::new(dir.path(), 5);
        let articles = vec![article(1)];
        let result = selection(&articles);

        sink.append("run-1", RunSlot::Morning, as_of(), &result, &articles)
            .unwrap();
        sink.append(
            "run-2",
            RunSlot::Afternoon,
            as_of() + chrono::Duration::hours(6),
            &result,
            &articles,
        )
        .unwrap();

        let content = fs::read_to_string(dir.path().join("2026-02-01.md")).unwrap();
        let morning = content.find("## Morning report").unwrap();
        let afternoon = content.find("## Afternoon report").unwrap();
        assert!(morning < afternoon);
    }

    #[test]
    fn test_skipped_run_writes_notice() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownReportSink::new(dir.path(), 5);

        sink.append(
            "run-1",
            RunSlot::Evening,
            as_of(),
            &SelectionResult::skipped(),
            &[],
        )
        .unwrap();

        let content = fs::read_to_string(dir.path().join("2026-02-01.md")).unwrap();
        assert!(content.contains("run skipped"));
    }

    #[test]
    fn test_articles_per_topic_cap() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownReportSink::new(dir.path(), 2);
        let articles: Vec<Article> = (1..=4).map(article).collect();

        sink.append("run-1", RunSlot::Morning, as_of(), &selection(&articles), &articles)
            .unwrap();

        let content = fs::read_to_string(dir.path().join("2026-02-01.md")).unwrap();
        assert_eq!(content.matches("https://example.com/").count(), 2);
        // Newest first: articles 1 and 2 are the most recent.
        assert!(content.contains("https://example.com/1"));
        assert!(content.contains("https://example.com/2"));
    }

    #[test]
    fn test_depth_stars() {
        assert_eq!(depth_stars(0.0), "☆☆☆☆☆");
        assert_eq!(depth_stars(0.5), "★★☆☆☆");
        assert_eq!(depth_stars(1.0), "★★★★★");
    }

    #[test]
    fn test_escape_markdown_brackets() {
        assert_eq!(escape_markdown("a [b] c"), "a \\[b\\] c");
    }
}
