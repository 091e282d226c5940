use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Category, RunSlot};

/// Full monitor configuration, loaded from a TOML file.
///
/// Every field has a default so a minimal file (just `[[feeds]]` entries)
/// is enough to run. Out-of-range values are rejected at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub heat: HeatConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            extraction: ExtractionConfig::default(),
            clustering: ClusteringConfig::default(),
            heat: HeatConfig::default(),
            selection: SelectionConfig::default(),
            schedule: ScheduleConfig::default(),
            model: ModelConfig::default(),
            feeds: Vec::new(),
            data_dir: default_data_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: MonitorConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make scoring or scheduling
    /// meaningless. Called from `load`; also usable on hand-built configs.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.clustering.similarity_threshold) {
            bail!(
                "clustering.similarity_threshold must be in [0,1], got {}",
                self.clustering.similarity_threshold
            );
        }
        if !(0.0..=100.0).contains(&self.selection.min_heat_threshold) {
            bail!(
                "selection.min_heat_threshold must be in [0,100], got {}",
                self.selection.min_heat_threshold
            );
        }
        for (name, value) in [
            ("heat.mention_cap_weight", self.heat.mention_cap_weight),
            ("heat.depth_weight_scale", self.heat.depth_weight_scale),
            ("heat.category_weight_scale", self.heat.category_weight_scale),
        ] {
            if value < 0.0 {
                bail!("{} must be non-negative, got {}", name, value);
            }
        }
        for (category, weight) in &self.heat.category_weights {
            if !(0.0..=1.0).contains(weight) {
                bail!(
                    "heat.category_weights.{} must be in [0,1], got {}",
                    category,
                    weight
                );
            }
        }
        if !(0.0..=1.0).contains(&self.extraction.default_depth) {
            bail!(
                "extraction.default_depth must be in [0,1], got {}",
                self.extraction.default_depth
            );
        }
        if self.extraction.concurrency_limit == 0 {
            bail!("extraction.concurrency_limit must be at least 1");
        }
        if self.fetch.lookback_hours < 1 {
            bail!(
                "fetch.lookback_hours must be at least 1, got {}",
                self.fetch.lookback_hours
            );
        }
        if self.model.max_tokens == 0 {
            bail!("model.max_tokens must be at least 1");
        }
        self.schedule.parse_timezone()?;
        for slot in RunSlot::ALL {
            self.schedule.slot_time(slot).with_context(|| {
                format!("schedule.{} is not a valid HH:MM time", slot.as_str())
            })?;
        }
        for feed in &self.feeds {
            url::Url::parse(&feed.url)
                .with_context(|| format!("feeds entry '{}' has an invalid url", feed.name))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// How far back each run looks for new articles.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    /// Cap on stored plain-text length per article.
    #[serde(default = "default_max_article_chars")]
    pub max_article_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            max_article_chars: default_max_article_chars(),
        }
    }
}

fn default_lookback_hours() -> i64 {
    24
}
fn default_max_article_chars() -> usize {
    4000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Retry budget for transient model failures, per article.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fan-out limit for concurrent extraction calls.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Depth substituted when the model omits its depth signal.
    #[serde(default = "default_depth")]
    pub default_depth: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            concurrency_limit: default_concurrency_limit(),
            default_depth: default_depth(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_concurrency_limit() -> usize {
    4
}
fn default_depth() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Minimum similarity for two labels to denote the same topic.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Permit merging candidates whose categories differ.
    #[serde(default)]
    pub allow_cross_category_merge: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            allow_cross_category_merge: false,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.75
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatConfig {
    /// Saturating mention term: 10 mentions reach this full weight.
    #[serde(default = "default_mention_cap_weight")]
    pub mention_cap_weight: f64,
    #[serde(default = "default_depth_weight_scale")]
    pub depth_weight_scale: f64,
    #[serde(default = "default_category_weight_scale")]
    pub category_weight_scale: f64,
    /// Per-category priority weight in [0,1].
    #[serde(default = "default_category_weights")]
    pub category_weights: BTreeMap<Category, f64>,
}

impl HeatConfig {
    /// Weight for a category, falling back to 0.5 for unconfigured ones.
    pub fn category_weight(&self, category: Category) -> f64 {
        self.category_weights.get(&category).copied().unwrap_or(0.5)
    }
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            mention_cap_weight: default_mention_cap_weight(),
            depth_weight_scale: default_depth_weight_scale(),
            category_weight_scale: default_category_weight_scale(),
            category_weights: default_category_weights(),
        }
    }
}

fn default_mention_cap_weight() -> f64 {
    60.0
}
fn default_depth_weight_scale() -> f64 {
    30.0
}
fn default_category_weight_scale() -> f64 {
    10.0
}
fn default_category_weights() -> BTreeMap<Category, f64> {
    BTreeMap::from([
        (Category::Engineering, 1.0),
        (Category::Research, 0.9),
        (Category::Product, 0.7),
        (Category::Industry, 0.5),
        (Category::Community, 0.4),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_topics_per_report")]
    pub topics_per_report: usize,
    /// Cap on articles listed under each topic in the report.
    #[serde(default = "default_articles_per_topic")]
    pub articles_per_topic: usize,
    /// Below this article count the acceptance bar is relaxed.
    #[serde(default = "default_low_article_floor")]
    pub low_article_floor: usize,
    /// Minimum heat for a topic to be reported under normal volume.
    /// 0.0 disables the filter.
    #[serde(default)]
    pub min_heat_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            topics_per_report: default_topics_per_report(),
            articles_per_topic: default_articles_per_topic(),
            low_article_floor: default_low_article_floor(),
            min_heat_threshold: 0.0,
        }
    }
}

fn default_topics_per_report() -> usize {
    3
}
fn default_articles_per_topic() -> usize {
    5
}
fn default_low_article_floor() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_morning")]
    pub morning: String,
    #[serde(default = "default_afternoon")]
    pub afternoon: String,
    #[serde(default = "default_evening")]
    pub evening: String,
    /// IANA timezone the slot times are interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl ScheduleConfig {
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("Invalid timezone: {}", self.timezone))
    }

    /// Parse a slot's "HH:MM" into hour and minute.
    pub fn slot_time(&self, slot: RunSlot) -> Result<(u32, u32)> {
        let raw = match slot {
            RunSlot::Morning => &self.morning,
            RunSlot::Afternoon => &self.afternoon,
            RunSlot::Evening => &self.evening,
        };
        let (hour, minute) = raw
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Expected HH:MM, got '{raw}'"))?;
        let hour: u32 = hour.parse().with_context(|| format!("Bad hour in '{raw}'"))?;
        let minute: u32 = minute
            .parse()
            .with_context(|| format!("Bad minute in '{raw}'"))?;
        if hour > 23 || minute > 59 {
            bail!("Time out of range: '{raw}'");
        }
        Ok((hour, minute))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            morning: default_morning(),
            afternoon: default_afternoon(),
            evening: default_evening(),
            timezone: default_timezone(),
        }
    }
}

fn default_morning() -> String {
    "09:30".to_string()
}
fn default_afternoon() -> String {
    "15:30".to_string()
}
fn default_evening() -> String {
    "20:30".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}

/// One monitored feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// API credentials, taken from the environment rather than the config file.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub anthropic_api_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::try_load_dotenv();

        let anthropic_api_key = env::var("ANTHROPIC_API_KEY").context(
            "ANTHROPIC_API_KEY not found.\n\n\
            To fix this, create ~/.config/topic-monitor/.env with:\n  \
            ANTHROPIC_API_KEY=your_key_here\n\n\
            Get your Anthropic API key from: https://console.anthropic.com/settings/keys",
        )?;

        Ok(Self { anthropic_api_key })
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/topic-monitor/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("topic-monitor").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}
