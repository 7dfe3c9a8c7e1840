//! # Batch Quality Test Suite
//!
//! Three independent sub-tests over a rendered batch, combined into one score:
//! - `distribution`: provider spread (count, max share, realtime + deep presence)
//! - `diversity`: content categories of title + summary
//! - `density`: information density of the rendered text
//!
//! `run_full_test` passes only when every sub-test passes and the mean score
//! reaches the configured threshold.

pub mod density;
pub mod distribution;
pub mod diversity;
pub mod lexicon;
pub mod narrative;

use serde::{Deserialize, Serialize};

use crate::render::RenderedItem;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityConfig {
    #[serde(default = "default_min_providers")]
    pub min_providers: usize,
    #[serde(default = "default_max_provider_share")]
    pub max_provider_share: f64,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    #[serde(default = "default_density_pass")]
    pub density_pass: f64,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_realtime")]
    pub realtime_providers: Vec<String>,
    #[serde(default = "default_deep")]
    pub deep_providers: Vec<String>,
}

fn default_min_providers() -> usize {
    3
}
fn default_max_provider_share() -> f64 {
    0.40
}
fn default_pass_threshold() -> f64 {
    70.0
}
fn default_density_pass() -> f64 {
    60.0
}
fn default_min_words() -> usize {
    200
}
fn default_max_words() -> usize {
    800
}
fn default_realtime() -> Vec<String> {
    vec!["twitter".into(), "producthunt".into()]
}
fn default_deep() -> Vec<String> {
    vec!["hackernews".into(), "reddit".into()]
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_providers: default_min_providers(),
            max_provider_share: default_max_provider_share(),
            pass_threshold: default_pass_threshold(),
            density_pass: default_density_pass(),
            min_words: default_min_words(),
            max_words: default_max_words(),
            realtime_providers: default_realtime(),
            deep_providers: default_deep(),
        }
    }
}

/// Outcome of one sub-test. `score` is on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub passed: bool,
    pub score: f64,
    pub issues: Vec<String>,
    pub details: serde_json::Value,
}

impl TestResult {
    pub(crate) fn empty_batch() -> Self {
        Self {
            passed: false,
            score: 0.0,
            issues: vec![ISSUE_EMPTY_BATCH.to_string()],
            details: serde_json::json!({ "total_items": 0 }),
        }
    }
}

pub const ISSUE_EMPTY_BATCH: &str = "empty batch";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullTestResult {
    pub passed: bool,
    pub total_score: f64,
    pub distribution: TestResult,
    pub diversity: TestResult,
    pub density: TestResult,
}

impl FullTestResult {
    /// Issues of all three sub-tests, in sub-test order.
    pub fn issues(&self) -> impl Iterator<Item = &str> {
        self.distribution
            .issues
            .iter()
            .chain(&self.diversity.issues)
            .chain(&self.density.issues)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    cfg: QualityConfig,
}

impl TestSuite {
    pub fn new(cfg: QualityConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.cfg
    }

    pub fn test_distribution(&self, items: &[RenderedItem]) -> TestResult {
        distribution::run(items, &self.cfg)
    }

    pub fn test_diversity(&self, items: &[RenderedItem]) -> TestResult {
        diversity::run(items)
    }

    pub fn test_density(&self, items: &[RenderedItem]) -> TestResult {
        density::run(items, &self.cfg)
    }

    pub fn run_full_test(&self, items: &[RenderedItem]) -> FullTestResult {
        let distribution = self.test_distribution(items);
        let diversity = self.test_diversity(items);
        let density = self.test_density(items);

        let total_score = (distribution.score + diversity.score + density.score) / 3.0;
        let passed = distribution.passed
            && diversity.passed
            && density.passed
            && total_score >= self.cfg.pass_threshold;

        tracing::debug!(
            target: "quality",
            score = total_score,
            passed,
            distribution = distribution.score,
            diversity = diversity.score,
            density = density.score,
            "batch tested"
        );

        FullTestResult {
            passed,
            total_score,
            distribution,
            diversity,
            density,
        }
    }
}
