//! Keyword sets shared by the test suite and the reviewer.
//!
//! Matching is case-insensitive and anchored on word boundaries, so `api`
//! does not fire inside `capital` and `app` does not fire inside `happen`.

use once_cell::sync::Lazy;
use regex::Regex;

/// A compiled alternation of literal terms.
pub struct TermSet {
    re: Regex,
}

impl TermSet {
    /// Terms are escaped; callers pass plain phrases.
    pub fn new(terms: &[&str]) -> Self {
        let alts = terms
            .iter()
            .map(|t| regex::escape(t.trim()))
            .collect::<Vec<_>>()
            .join("|");
        // Escaped literals always form a valid pattern.
        let re = Regex::new(&format!(r"(?i)\b(?:{alts})\b")).unwrap();
        Self { re }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.re.is_match(text)
    }

    /// Number of non-overlapping occurrences.
    pub fn count(&self, text: &str) -> usize {
        self.re.find_iter(text).count()
    }

    /// Distinct matched terms, lowercased, in first-seen order.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in self.re.find_iter(text) {
            let t = m.as_str().to_lowercase();
            if !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }
}

/// Content categories for the diversity test, in match priority order.
pub static CATEGORIES: Lazy<Vec<(&'static str, TermSet)>> = Lazy::new(|| {
    vec![
        (
            "model_framework",
            TermSet::new(&[
                "model", "models", "llm", "llms", "gpt", "transformer", "neural", "framework",
                "fine-tuning", "fine-tuned", "inference", "embedding", "embeddings", "diffusion",
                "agent", "agents",
            ]),
        ),
        (
            "developer_tool",
            TermSet::new(&[
                "cli", "sdk", "api", "library", "devtool", "ide", "plugin", "debugger",
                "compiler", "terminal", "linter", "editor", "toolkit",
            ]),
        ),
        (
            "consumer_product",
            TermSet::new(&[
                "app", "ios", "android", "mobile", "subscription", "consumer", "platform",
                "service", "product",
            ]),
        ),
        (
            "open_source",
            TermSet::new(&[
                "open source", "open-source", "github", "repository", "repo", "self-hosted",
                "mit license", "apache 2.0",
            ]),
        ),
        (
            "research",
            TermSet::new(&[
                "paper", "arxiv", "research", "study", "benchmark", "dataset", "preprint",
            ]),
        ),
    ]
});

pub const OTHER_CATEGORY: &str = "other";

/// First matching category for `text`, else [`OTHER_CATEGORY`].
pub fn categorize(text: &str) -> &'static str {
    CATEGORIES
        .iter()
        .find(|(_, set)| set.is_match(text))
        .map(|(name, _)| *name)
        .unwrap_or(OTHER_CATEGORY)
}

pub static TECHNICAL: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "architecture", "algorithm", "api", "latency", "throughput", "benchmark", "rust",
        "python", "typescript", "javascript", "golang", "gpu", "cpu", "memory", "database",
        "protocol", "parameters", "implementation", "implemented", "written in", "built on",
        "built with", "based on", "runtime", "kubernetes", "docker", "webassembly", "wasm",
        "vector", "inference", "compiler", "codebase", "source code",
    ])
});

pub static USAGE: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "install", "installed", "pip install", "npm install", "cargo install", "brew install",
        "docker run", "getting started", "setup", "set up", "configure", "configuration",
        "run it", "try it", "sign up", "download", "self-host", "quickstart", "usage",
        "how to use", "command",
    ])
});

/// Vague marketing phrases; every occurrence costs points.
pub static FILLER: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "game changer", "game-changer", "revolutionary", "groundbreaking", "cutting-edge",
        "cutting edge", "next-generation", "seamless", "seamlessly", "unleash", "supercharge",
        "world-class", "best-in-class", "paradigm shift", "the future of", "must-have",
        "mind-blowing", "pain points", "addresses the need", "focuses on",
    ])
});

/// Stock structural phrases that make prose read like a template.
pub static TEMPLATE: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "firstly", "secondly", "thirdly", "lastly", "first of all", "in summary",
        "in conclusion", "to sum up", "overall", "last but not least", "in a nutshell",
        "it is worth noting", "all in all",
    ])
});

pub fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
