// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::provider_weights::ProviderWeights;
use crate::quality::QualityConfig;

pub const ENV_CONFIG_PATH: &str = "TREND_GATE_CONFIG";
pub const ENV_REVIEW_THRESHOLD: &str = "TREND_GATE_REVIEW_THRESHOLD";
pub const ENV_MAX_ITERATIONS: &str = "TREND_GATE_MAX_ITERATIONS";
pub const ENV_TARGET_COUNT: &str = "TREND_GATE_TARGET_COUNT";

const MAX_ITERATIONS_CEIL: u32 = 20;
const TARGET_COUNT_CEIL: usize = 50;

fn default_max_iterations() -> u32 {
    5
}
fn default_target_count() -> usize {
    5
}
fn default_per_provider_cap() -> usize {
    2
}
fn default_review_threshold() -> f64 {
    8.0
}
fn default_true() -> bool {
    true
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_trace_dir() -> PathBuf {
    PathBuf::from("logs/traces")
}
fn default_trace_prefix() -> String {
    crate::ledger::DEFAULT_PREFIX.to_string()
}
fn default_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_trace_dir")]
    pub trace_dir: PathBuf,
    #[serde(default = "default_trace_prefix")]
    pub trace_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            trace_dir: default_trace_dir(),
            trace_prefix: default_trace_prefix(),
        }
    }
}

impl StorageConfig {
    pub fn published_path(&self) -> PathBuf {
        self.state_dir.join("published.json")
    }

    pub fn runs_path(&self) -> PathBuf {
        self.state_dir.join("runs.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
        }
    }
}

/// One RSS/Atom feed wired as a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Provider name the feed's items are attributed to.
    pub provider: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_target_count")]
    pub target_count: usize,
    #[serde(default = "default_per_provider_cap")]
    pub per_provider_cap: usize,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    /// Substitute a minimal rendering when generation fails (else drop the item).
    #[serde(default = "default_true")]
    pub render_fallback: bool,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub providers: ProviderWeights,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            target_count: default_target_count(),
            per_provider_cap: default_per_provider_cap(),
            review_threshold: default_review_threshold(),
            render_fallback: true,
            storage: StorageConfig::default(),
            quality: QualityConfig::default(),
            providers: ProviderWeights::default(),
            scheduler: SchedulerConfig::default(),
            feeds: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from an explicit path. TOML or JSON, chosen by extension (TOML otherwise).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: Self = if ext == "json" {
            serde_json::from_str(&content).context("parsing pipeline config json")?
        } else {
            toml::from_str(&content).context("parsing pipeline config toml")?
        };
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $TREND_GATE_CONFIG
    /// 2) config/pipeline.toml
    /// 3) config/pipeline.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new("config/pipeline.toml").exists() {
            Self::load_from(Path::new("config/pipeline.toml"))?
        } else if Path::new("config/pipeline.json").exists() {
            Self::load_from(Path::new("config/pipeline.json"))?
        } else {
            Self::default()
        };
        Ok(cfg.with_env_overrides())
    }

    /// Apply `TREND_GATE_*` overrides; malformed values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<f64>(ENV_REVIEW_THRESHOLD).filter(|v| v.is_finite()) {
            self.review_threshold = v.clamp(0.0, crate::review::MAX_TOTAL);
        }
        if let Some(v) = env_parse::<u32>(ENV_MAX_ITERATIONS) {
            self.max_iterations = v.clamp(1, MAX_ITERATIONS_CEIL);
        }
        if let Some(v) = env_parse::<usize>(ENV_TARGET_COUNT) {
            self.target_count = v.clamp(1, TARGET_COUNT_CEIL);
        }
        self.sanitized()
    }

    /// Clamp values into ranges the loop can work with.
    pub fn sanitized(mut self) -> Self {
        self.max_iterations = self.max_iterations.clamp(1, MAX_ITERATIONS_CEIL);
        self.target_count = self.target_count.clamp(1, TARGET_COUNT_CEIL);
        self.per_provider_cap = self.per_provider_cap.max(1);
        if !self.review_threshold.is_finite() {
            self.review_threshold = default_review_threshold();
        }
        let share = self.quality.max_provider_share;
        if !(share > 0.0 && share <= 1.0) {
            self.quality.max_provider_share = QualityConfig::default().max_provider_share;
        }
        if self.quality.min_words > self.quality.max_words {
            std::mem::swap(&mut self.quality.min_words, &mut self.quality.max_words);
        }
        self.storage.trace_prefix = crate::ledger::normalize_prefix(&self.storage.trace_prefix);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
