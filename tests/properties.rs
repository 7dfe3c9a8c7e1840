// tests/properties.rs
//
// Invariants of the pure components, checked over hand-picked input sets.

use chrono::{Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};

use trend_gate::ingest::types::Candidate;
use trend_gate::provider_weights::ProviderWeights;
use trend_gate::quality::TestSuite;
use trend_gate::render::RenderedItem;
use trend_gate::review::{self, HeuristicReviewer};
use trend_gate::selector::{SelectParams, Selector};
use trend_gate::tracker::{canonicalize, NoveltyTracker};

const URLS: &[&str] = &[
    "https://a.dev/x",
    "https://a.dev/x?utm_source=hn&utm_medium=social",
    "https://a.dev/x?id=7&ref=producthunt&fbclid=abc",
    "https://a.dev/x?b=2&a=1#frag",
    "HTTPS://A.DEV/Path/?UTM_Campaign=x",
    "https://a.dev/x?q=a%20b&gclid=1",
    "not a url",
    "",
    "mailto:someone@example.com",
];

#[test]
fn canonicalize_is_idempotent() {
    for u in URLS {
        let once = canonicalize(u);
        assert_eq!(canonicalize(&once), once, "input {u:?}");
    }
}

#[test]
fn dedup_window_boundary_is_exclusive() {
    let tracker = NoveltyTracker::in_memory();
    let t = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
    let mut c = Candidate::new("reddit", "https://a.dev/x?utm_source=r", "X", t);
    c.canonical_url = canonicalize(&c.url);
    assert_eq!(tracker.record_published_at(&[c], t), 1);

    assert!(tracker.is_duplicate_at("https://a.dev/x", t));
    assert!(tracker.is_duplicate_at("https://a.dev/x?ref=hn", t + Duration::hours(23)));
    assert!(tracker.is_duplicate_at("https://a.dev/x", t + Duration::hours(24) - Duration::seconds(1)));
    assert!(!tracker.is_duplicate_at("https://a.dev/x", t + Duration::hours(24)));
    assert!(!tracker.is_duplicate_at("https://a.dev/other", t));
}

fn pool() -> Vec<Candidate> {
    let now = Utc::now();
    let mut out = Vec::new();
    for (i, p) in ["reddit", "reddit", "reddit", "hn", "hackernews", "twitter", "x", "x", "tavily"]
        .iter()
        .enumerate()
    {
        let mut c = Candidate::new(*p, format!("https://a.dev/{i}"), format!("Item {i}"), now)
            .with_signal("score", 10.0);
        c.canonical_url = c.url.clone();
        out.push(c);
    }
    out
}

#[test]
fn selector_respects_cap_for_every_combination() {
    let weights = ProviderWeights::default();
    let selector = Selector::new(weights.clone());
    let now = Utc::now();
    for target in 1..=9 {
        for cap in 1..=4 {
            let sel = selector.select_at(
                pool(),
                SelectParams {
                    target_count: target,
                    per_provider_cap: cap,
                },
                &HashSet::new(),
                now,
            );
            assert!(sel.len() <= target);
            let mut per: BTreeMap<String, usize> = BTreeMap::new();
            for c in sel.candidates() {
                *per.entry(weights.canonical(&c.provider)).or_default() += 1;
            }
            assert!(per.values().all(|n| *n <= cap), "target {target} cap {cap}: {per:?}");
        }
    }
}

#[test]
fn selector_is_deterministic() {
    let selector = Selector::new(ProviderWeights::default());
    let now = Utc::now();
    let params = SelectParams {
        target_count: 5,
        per_provider_cap: 2,
    };
    let run = || {
        selector
            .select_at(pool(), params, &HashSet::new(), now)
            .candidates()
            .map(|c| c.url.clone())
            .collect::<Vec<_>>()
    };
    let first = run();
    for _ in 0..10 {
        assert_eq!(run(), first);
    }
}

fn item(provider: &str, title: &str, text: &str) -> RenderedItem {
    RenderedItem {
        candidate: Candidate::new(provider, format!("https://a.dev/{provider}"), title, Utc::now()),
        text: text.to_string(),
        fallback: false,
    }
}

#[test]
fn one_provider_one_category_fails_distribution_and_diversity() {
    let suite = TestSuite::default();
    for n in 1..=6 {
        let batch: Vec<_> = (0..n)
            .map(|i| item("reddit", &format!("New LLM {i}"), "text"))
            .collect();
        let r = suite.run_full_test(&batch);
        assert!(!r.distribution.passed, "n={n}");
        assert!(!r.diversity.passed, "n={n}");
        assert!(!r.passed);
    }
}

#[test]
fn four_providers_three_categories_long_text_passes() {
    // 300+ words, a digit, no filler phrases.
    let text = "Version 2 of the project ships with a smaller footprint and clearer docs. ".repeat(25);
    let batch = vec![
        item("twitter", "New LLM for code", &text),
        item("hackernews", "A CLI for logs", &text),
        item("reddit", "Photo app for iOS", &text),
        item("producthunt", "Notes app", &text),
    ];
    let r = TestSuite::default().run_full_test(&batch);
    assert!(r.total_score >= 70.0, "{r:?}");
    assert!(r.passed, "{:?}", r.issues().collect::<Vec<_>>());
}

#[test]
fn reviewer_scores_stay_in_range() {
    let long = "revolutionary seamless game changer firstly overall ".repeat(50);
    let inputs = [
        "",
        "x",
        "It is a tool that lets you install it. Written in Rust, 3x faster than grep.",
        long.as_str(),
        "For example, users report it is better than the alternative; however it is beta.",
    ];
    let reviewer = HeuristicReviewer;
    for text in inputs {
        let r = reviewer.review(text);
        let d = r.dimensions;
        assert!((0.0..=review::MAX_INFORMATION).contains(&d.information));
        assert!((0.0..=review::MAX_PRACTICALITY).contains(&d.practicality));
        assert!((0.0..=review::MAX_CREDIBILITY).contains(&d.credibility));
        assert!((0.0..=review::MAX_EXPERIENCE).contains(&d.experience));
        assert!((0.0..=review::MAX_TOTAL).contains(&r.total));
    }
}
