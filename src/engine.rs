//! # Gate Engine
//! Pure, testable logic for the DECIDE and OPTIMIZE steps of the loop.
//! No I/O, suitable for unit tests and offline replays.
//!
//! Policy: a batch passes when the test suite passed AND the reviewer average
//! reaches the threshold. Otherwise the most frequent issue strings become
//! hints that steer the next iteration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::quality::narrative::{RepeatedPair, ISSUE_REPEATED_NARRATIVE};
use crate::quality::{density, distribution, diversity, FullTestResult};
use crate::render::RenderedItem;
use crate::review::{self, BatchReview};

pub const TOP_ISSUES: usize = 5;

/// Gate failure is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Fail { reasons: Vec<String> },
}

impl GateDecision {
    pub fn passed(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }
}

pub fn decide(test: &FullTestResult, review: &BatchReview, review_threshold: f64) -> GateDecision {
    let review_ok = !review.items.is_empty() && review.average >= review_threshold;
    if test.passed && review_ok {
        return GateDecision::Pass;
    }
    let mut reasons = Vec::new();
    if !test.passed {
        reasons.push(format!("test suite failed ({:.1})", test.total_score));
    }
    if !review_ok {
        reasons.push(format!(
            "review average {:.2} below {:.1}",
            review.average, review_threshold
        ));
    }
    GateDecision::Fail { reasons }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCount {
    pub issue: String,
    pub count: usize,
}

/// Carried from a failed iteration into the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationHints {
    /// Most frequent issue strings, most frequent first (ties keep first-seen order).
    pub top_issues: Vec<IssueCount>,
    /// Rewrite strategies for the generator, one per issue family.
    pub strategies: Vec<String>,
    /// Tightened per-provider cap after a distribution failure.
    pub per_provider_cap: Option<usize>,
    /// Identities (canonical URLs) whose rendering scored below the threshold.
    pub demoted: BTreeSet<String>,
}

impl OptimizationHints {
    pub fn is_empty(&self) -> bool {
        self.top_issues.is_empty() && self.per_provider_cap.is_none() && self.demoted.is_empty()
    }
}

/// Frequency count, most frequent first; ties keep first-seen order.
pub fn top_n<'a>(issues: impl IntoIterator<Item = &'a str>, n: usize) -> Vec<IssueCount> {
    let mut counts: Vec<IssueCount> = Vec::new();
    for i in issues {
        match counts.iter_mut().find(|c| c.issue == i) {
            Some(c) => c.count += 1,
            None => counts.push(IssueCount {
                issue: i.to_string(),
                count: 1,
            }),
        }
    }
    // sort_by is stable, so equal counts stay in first-seen order.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(n);
    counts
}

fn strategy_for(issue: &str) -> Option<&'static str> {
    match issue {
        distribution::ISSUE_TOO_FEW_PROVIDERS
        | distribution::ISSUE_PROVIDER_DOMINATES
        | distribution::ISSUE_NO_REALTIME
        | distribution::ISSUE_NO_DEEP => {
            Some("Spread the batch across more providers, including realtime and discussion sources.")
        }
        diversity::ISSUE_NARROW_CATEGORIES | diversity::ISSUE_SINGLE_CATEGORY => {
            Some("Mix content categories: models, developer tools, products, open source and research.")
        }
        density::ISSUE_LOW_DENSITY
        | density::ISSUE_TOO_SHORT
        | density::ISSUE_TOO_LONG
        | density::ISSUE_NO_TECHNICAL
        | density::ISSUE_NO_USAGE
        | review::WEAK_WHAT_IT_IS
        | review::WEAK_WHAT_IT_DOES
        | review::WEAK_TECHNICAL
        | review::WEAK_USAGE => Some(
            "Say what it is and what it does, name the technical approach and show how to start using it.",
        ),
        density::ISSUE_FILLER
        | review::WEAK_FILLER
        | review::WEAK_TEMPLATE_LIGHT
        | review::WEAK_TEMPLATE_HEAVY => {
            Some("Drop marketing filler and ordinal connectors; write plain sentences.")
        }
        review::WEAK_SCENARIO | review::WEAK_COMPARISON => {
            Some("Describe a concrete usage scenario and compare with the obvious alternative.")
        }
        density::ISSUE_NO_NUMBERS | review::WEAK_DATA | review::WEAK_FEEDBACK => {
            Some("Back claims with numbers and quote real user feedback.")
        }
        ISSUE_REPEATED_NARRATIVE => Some("Open each item differently; avoid a shared narrative."),
        _ => None,
    }
}

pub struct HintInputs<'a> {
    pub test: &'a FullTestResult,
    pub review: &'a BatchReview,
    pub items: &'a [RenderedItem],
    pub repeated: &'a [RepeatedPair],
    pub review_threshold: f64,
    pub target_count: usize,
    pub max_provider_share: f64,
}

/// OPTIMIZE step: top-5 issues, strategies, cap tightening and demotions.
pub fn extract_hints(input: &HintInputs<'_>) -> OptimizationHints {
    let narrative = (!input.repeated.is_empty()).then_some(ISSUE_REPEATED_NARRATIVE);
    let issues = input
        .test
        .issues()
        .chain(input.review.weaknesses())
        .chain(narrative);
    let top_issues = top_n(issues, TOP_ISSUES);

    let mut strategies: Vec<String> = Vec::new();
    for s in top_issues.iter().filter_map(|i| strategy_for(&i.issue)) {
        if !strategies.iter().any(|x| x == s) {
            strategies.push(s.to_string());
        }
    }

    let per_provider_cap = (!input.test.distribution.passed).then(|| {
        let cap = (input.target_count as f64 * input.max_provider_share).floor() as usize;
        cap.max(1)
    });

    let demoted = input
        .review
        .items
        .iter()
        .zip(input.items)
        .filter(|(r, _)| r.result.total < input.review_threshold)
        .map(|(_, it)| it.candidate.identity().to_string())
        .collect();

    OptimizationHints {
        top_issues,
        strategies,
        per_provider_cap,
        demoted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{QualityConfig, TestSuite};
    use crate::quality::fixtures::item;
    use crate::review::{ItemReview, ReviewResult};

    fn review_of(totals: &[f64], weaknesses: &[&[&str]]) -> BatchReview {
        let items: Vec<ItemReview> = totals
            .iter()
            .zip(weaknesses)
            .map(|(t, w)| ItemReview {
                trace_id: String::new(),
                url: String::new(),
                result: ReviewResult {
                    total: *t,
                    weaknesses: w.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
            })
            .collect();
        let average = totals.iter().sum::<f64>() / totals.len().max(1) as f64;
        BatchReview { items, average }
    }

    #[test]
    fn top_n_orders_by_count_then_first_seen() {
        let got = top_n(["b", "a", "a", "c", "b", "d"], 3);
        let names: Vec<_> = got.iter().map(|i| i.issue.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(got[0].count, 2);
    }

    #[test]
    fn pass_requires_both_gates() {
        let batch = vec![item("reddit", "x", "short")];
        let test = TestSuite::new(QualityConfig::default()).run_full_test(&batch);
        assert!(!test.passed);
        let good_review = review_of(&[9.0], &[&[]]);
        match decide(&test, &good_review, 8.0) {
            GateDecision::Fail { reasons } => assert_eq!(reasons.len(), 1),
            GateDecision::Pass => panic!("should fail"),
        }
    }

    #[test]
    fn empty_review_never_passes() {
        let test = TestSuite::default().run_full_test(&[]);
        assert!(!decide(&test, &BatchReview::default(), 0.0).passed());
    }

    #[test]
    fn hints_tighten_cap_and_demote_low_scorers() {
        let batch = vec![item("reddit", "a", "short"), item("reddit", "b", "short")];
        let test = TestSuite::default().run_full_test(&batch);
        let review = review_of(
            &[3.0, 9.0],
            &[&[review::WEAK_DATA, review::WEAK_SCENARIO], &[review::WEAK_DATA]],
        );
        let hints = extract_hints(&HintInputs {
            test: &test,
            review: &review,
            items: &batch,
            repeated: &[],
            review_threshold: 8.0,
            target_count: 5,
            max_provider_share: 0.4,
        });
        assert_eq!(hints.per_provider_cap, Some(2));
        assert_eq!(hints.demoted.len(), 1);
        assert!(hints.demoted.contains(batch[0].candidate.identity()));
        assert_eq!(hints.top_issues[0].issue, review::WEAK_DATA);
        assert_eq!(hints.top_issues.len(), TOP_ISSUES);
        assert!(!hints.strategies.is_empty());
    }
}
