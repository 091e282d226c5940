use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use shared::{
    ClaudeTopicModel, Credentials, MarkdownReportSink, MonitorConfig, MonitorScheduler, Pipeline,
    RssArticleSource, RunSlot,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "topic-monitor")]
#[command(about = "Monitor tech blog feeds and report the hottest topics")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Run as a service, executing the three daily scheduled slots
    #[arg(long, conflicts_with = "run")]
    daemon: bool,

    /// Execute a single slot now (morning, afternoon, evening)
    #[arg(long, value_name = "SLOT")]
    run: Option<String>,

    /// Override the run date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = MonitorConfig::load(&args.config)?;
    let credentials = Credentials::from_env()?;

    let model = Arc::new(
        ClaudeTopicModel::new(credentials.anthropic_api_key, config.model.clone())
            .context("Failed to construct language model client")?,
    );
    let source = Arc::new(RssArticleSource::new(
        config.feeds.clone(),
        config.fetch.max_article_chars,
    )?);
    let sink = Arc::new(MarkdownReportSink::new(
        config.reports_dir.clone(),
        config.selection.articles_per_topic,
    ));
    let pipeline = Arc::new(Pipeline::new(&config, model, source, sink));

    if args.daemon {
        return run_daemon(&config, pipeline).await;
    }

    if let Some(slot_name) = args.run.as_deref() {
        let slot = RunSlot::parse(slot_name).with_context(|| {
            format!("Invalid slot '{slot_name}'. Use 'morning', 'afternoon', or 'evening'")
        })?;
        let as_of = resolve_as_of(args.date.as_deref())?;

        info!(%slot, date = %as_of.format("%Y-%m-%d"), "Manual run requested");
        shared::run_slot(&pipeline, slot, config.fetch.lookback_hours, as_of)
            .await
            .map_err(|e| anyhow::anyhow!("Run failed: {e}"))?;
        return Ok(());
    }

    anyhow::bail!("Nothing to do: pass --daemon or --run <slot> (see --help)")
}

async fn run_daemon(config: &MonitorConfig, pipeline: Arc<Pipeline>) -> Result<()> {
    let mut scheduler =
        MonitorScheduler::new(&config.schedule, config.fetch.lookback_hours, pipeline).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    // Any in-flight run is dropped with the scheduler; no partial result
    // is written.
    scheduler.shutdown().await;
    Ok(())
}

/// Resolve the run timestamp: today's instant, or the given date at the
/// current wall-clock time.
fn resolve_as_of(date: Option<&str>) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    match date {
        None => Ok(now),
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{raw}', expected YYYY-MM-DD"))?;
            Ok(date.and_time(now.time()).and_utc())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_as_of_default_is_now() {
        let resolved = resolve_as_of(None).unwrap();
        assert!((Utc::now() - resolved).num_seconds() < 5);
    }

    #[test]
    fn test_resolve_as_of_with_date_override() {
        let resolved = resolve_as_of(Some("2026-02-01")).unwrap();
        assert_eq!(resolved.format("%Y-%m-%d").to_string(), "2026-02-01");
    }

    #[test]
    fn test_resolve_as_of_rejects_garbage() {
        assert!(resolve_as_of(Some("February 1st")).is_err());
    }
}
