//! # Content Reviewer
//!
//! Scores one rendered text on four weighted dimensions (max 10):
//! information 0-4, practicality 0-3, credibility 0-2, reading experience 0-1.
//!
//! Scoring sits behind the [`Scorer`] capability so the keyword heuristic can
//! be swapped for a model-backed reviewer without touching the controller.
//! The textual output (summary, strengths, weaknesses, suggestions) is advisory.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::quality::lexicon::{has_digit, TermSet, FILLER, TECHNICAL, TEMPLATE, USAGE};
use crate::render::RenderedItem;

pub const MAX_INFORMATION: f64 = 4.0;
pub const MAX_PRACTICALITY: f64 = 3.0;
pub const MAX_CREDIBILITY: f64 = 2.0;
pub const MAX_EXPERIENCE: f64 = 1.0;
pub const MAX_TOTAL: f64 = 10.0;

pub const WEAK_WHAT_IT_IS: &str = "does not say what it is";
pub const WEAK_WHAT_IT_DOES: &str = "does not say what it does";
pub const WEAK_TECHNICAL: &str = "no implementation detail";
pub const WEAK_USAGE: &str = "no usage or setup detail";
pub const WEAK_FILLER: &str = "too many filler phrases";
pub const WEAK_SCENARIO: &str = "no concrete usage scenario";
pub const WEAK_COMPARISON: &str = "no comparison with alternatives";
pub const WEAK_DATA: &str = "no concrete data";
pub const WEAK_FEEDBACK: &str = "no third-party feedback";
pub const WEAK_TEMPLATE_LIGHT: &str = "slightly formulaic wording";
pub const WEAK_TEMPLATE_HEAVY: &str = "reads like a template";

static WHAT_IT_IS: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "is a", "is an", "is the", "introduces", "called", "named", "meet", "a new",
    ])
});
static WHAT_IT_DOES: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "lets you", "allows", "enables", "helps", "supports", "provides", "automates",
        "generates", "turns", "converts", "can be used",
    ])
});
static SCENARIO: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "for example", "e.g", "use case", "scenario", "workflow", "when you", "if you",
        "in production", "useful for", "suited for",
    ])
});
static COMPARISON: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "compared to", "compared with", "versus", "vs", "alternative to", "unlike",
        "faster than", "cheaper than", "better than", "lighter than", "instead of",
    ])
});
static AUDIENCE: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "developers", "engineers", "teams", "researchers", "designers", "startups",
        "beginners", "students", "users",
    ])
});
static FEEDBACK: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "according to", "commenters", "users report", "users say", "reviewers", "feedback",
        "the author", "maintainers", "said", "wrote", "mentioned",
    ])
});
static LIMITATION: Lazy<TermSet> = Lazy::new(|| {
    TermSet::new(&[
        "however", "limitation", "limitations", "caveat", "downside", "drawback",
        "only supports", "not yet", "beta", "early stage", "watch out",
    ])
});

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub information: f64,
    pub practicality: f64,
    pub credibility: f64,
    pub experience: f64,
}

impl Dimensions {
    pub fn total(&self) -> f64 {
        self.information + self.practicality + self.credibility + self.experience
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReviewResult {
    pub total: f64,
    pub dimensions: Dimensions,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Scoring capability: `score(text) -> structured result`.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<ReviewResult>;
    fn name(&self) -> &str;
}

/// Keyword/pattern heuristic reviewer.
#[derive(Debug, Clone, Default)]
pub struct HeuristicReviewer;

impl HeuristicReviewer {
    pub fn review(&self, text: &str) -> ReviewResult {
        let mut d = Dimensions::default();
        let mut strengths: Vec<String> = Vec::new();
        let mut weaknesses: Vec<String> = Vec::new();
        let mut suggestions: Vec<String> = Vec::new();

        let mut check = |hit: bool, points: f64, dim: &mut f64, good: &str, weak: Option<&str>, tip: &str| {
            if hit {
                *dim += points;
                strengths.push(good.to_string());
            } else {
                if let Some(w) = weak {
                    weaknesses.push(w.to_string());
                }
                suggestions.push(tip.to_string());
            }
        };

        // 1) Information (0-4)
        check(
            WHAT_IT_IS.is_match(text),
            1.0,
            &mut d.information,
            "states what it is",
            Some(WEAK_WHAT_IT_IS),
            "Open with one sentence: X is a Y for Z.",
        );
        check(
            WHAT_IT_DOES.is_match(text),
            1.0,
            &mut d.information,
            "states what it does",
            Some(WEAK_WHAT_IT_DOES),
            "List the core capabilities in plain terms.",
        );
        check(
            TECHNICAL.is_match(text),
            1.0,
            &mut d.information,
            "includes a technical detail",
            Some(WEAK_TECHNICAL),
            "Name the language, architecture or key technique.",
        );
        check(
            USAGE.is_match(text),
            1.0,
            &mut d.information,
            "explains how to start using it",
            Some(WEAK_USAGE),
            "Add the install or setup step.",
        );

        // 2) Practicality (0-3)
        check(
            SCENARIO.is_match(text),
            1.5,
            &mut d.practicality,
            "describes a usage scenario",
            Some(WEAK_SCENARIO),
            "Describe when someone would reach for it.",
        );
        check(
            COMPARISON.is_match(text),
            1.0,
            &mut d.practicality,
            "compares with alternatives",
            Some(WEAK_COMPARISON),
            "Say why this over the obvious alternative.",
        );
        check(
            AUDIENCE.is_match(text),
            0.5,
            &mut d.practicality,
            "names its audience",
            None,
            "Say who it is for.",
        );

        // 3) Credibility (0-2)
        check(
            has_digit(text),
            0.5,
            &mut d.credibility,
            "backs claims with numbers",
            Some(WEAK_DATA),
            "Add a number: stars, speedup, price or user count.",
        );
        check(
            FEEDBACK.is_match(text),
            1.0,
            &mut d.credibility,
            "cites third-party feedback",
            Some(WEAK_FEEDBACK),
            "Quote what commenters or users actually said.",
        );
        check(
            LIMITATION.is_match(text),
            0.5,
            &mut d.credibility,
            "mentions a limitation",
            None,
            "Mention one limitation or caveat.",
        );

        // Filler penalty on information.
        let filler = FILLER.count(text);
        if filler > 2 {
            d.information = (d.information - 1.0).max(0.0);
            weaknesses.push(WEAK_FILLER.to_string());
            suggestions.push("Replace marketing phrases with concrete facts.".to_string());
        }

        // 4) Reading experience (0-1)
        let formulaic = TEMPLATE.count(text) + filler;
        d.experience = match formulaic {
            0 => {
                strengths.push("reads naturally".to_string());
                1.0
            }
            1 | 2 => {
                weaknesses.push(WEAK_TEMPLATE_LIGHT.to_string());
                suggestions.push("Drop ordinal connectors like 'firstly'.".to_string());
                0.5
            }
            _ => {
                weaknesses.push(WEAK_TEMPLATE_HEAVY.to_string());
                suggestions.push("Rewrite as if explaining it to a colleague.".to_string());
                0.0
            }
        };

        d.information = d.information.clamp(0.0, MAX_INFORMATION);
        d.practicality = d.practicality.clamp(0.0, MAX_PRACTICALITY);
        d.credibility = d.credibility.clamp(0.0, MAX_CREDIBILITY);
        let total = d.total().clamp(0.0, MAX_TOTAL);

        let summary = if total >= 8.0 {
            "Clear about what it is, what it does and when to use it. Ready to publish.".to_string()
        } else if total >= 6.0 {
            match weaknesses.first() {
                Some(w) => format!("Useful, but {w}; readers will need to look elsewhere."),
                None => "Useful, but some details are unclear.".to_string(),
            }
        } else {
            "Leaves the reader unsure what this is or why it matters.".to_string()
        };

        ReviewResult {
            total,
            dimensions: d,
            summary,
            strengths,
            weaknesses,
            suggestions,
        }
    }
}

#[async_trait]
impl Scorer for HeuristicReviewer {
    async fn score(&self, text: &str) -> Result<ReviewResult> {
        Ok(self.review(text))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemReview {
    pub trace_id: String,
    pub url: String,
    pub result: ReviewResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReview {
    pub items: Vec<ItemReview>,
    pub average: f64,
}

impl BatchReview {
    pub fn weaknesses(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .flat_map(|i| i.result.weaknesses.iter().map(String::as_str))
    }
}

pub const WEAK_REVIEW_UNAVAILABLE: &str = "review unavailable";

/// Review every item; a scorer error counts as a zero score for that item.
pub async fn review_batch(scorer: &dyn Scorer, items: &[RenderedItem]) -> BatchReview {
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let result = match scorer.score(&it.text).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "review", scorer = scorer.name(), error = ?e, trace_id = it.trace_id(), "scorer failed");
                ReviewResult {
                    weaknesses: vec![WEAK_REVIEW_UNAVAILABLE.to_string()],
                    summary: format!("scorer `{}` failed", scorer.name()),
                    ..Default::default()
                }
            }
        };
        tracing::debug!(target: "review", trace_id = it.trace_id(), score = result.total, "item reviewed");
        out.push(ItemReview {
            trace_id: it.trace_id().to_string(),
            url: it.candidate.url.clone(),
            result,
        });
    }
    let average = if out.is_empty() {
        0.0
    } else {
        out.iter().map(|r| r.result.total).sum::<f64>() / out.len() as f64
    };
    BatchReview {
        items: out,
        average,
    }
}
