// tests/common/mod.rs
//
// Shared collaborators for the loop integration tests: fixed providers,
// deterministic generators and a recording publisher.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

use trend_gate::config::PipelineConfig;
use trend_gate::controller::{Collaborators, LoopController};
use trend_gate::engine::OptimizationHints;
use trend_gate::ingest::types::{Candidate, SourceProvider};
use trend_gate::ledger::Ledger;
use trend_gate::publish::Publisher;
use trend_gate::render::{Generator, RenderedItem};
use trend_gate::review::HeuristicReviewer;
use trend_gate::tracker::NoveltyTracker;

pub fn candidate(provider: &str, slug: &str, title: &str) -> Candidate {
    Candidate::new(provider, format!("https://{provider}.example.com/{slug}"), title, Utc::now())
        .with_signal("score", 100.0)
        .with_signal("comments", 20.0)
}

/// Returns the same candidates on every call.
pub struct FixedProvider {
    pub name: String,
    pub items: Vec<Candidate>,
}

impl FixedProvider {
    pub fn boxed(name: &str, items: Vec<Candidate>) -> Box<dyn SourceProvider> {
        Box::new(Self {
            name: name.to_string(),
            items,
        })
    }
}

#[async_trait]
impl SourceProvider for FixedProvider {
    async fn discover(&self) -> Result<Vec<Candidate>> {
        Ok(self.items.clone())
    }
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct FailingProvider;

#[async_trait]
impl SourceProvider for FailingProvider {
    async fn discover(&self) -> Result<Vec<Candidate>> {
        Err(anyhow!("upstream returned 503"))
    }
    fn name(&self) -> &str {
        "broken"
    }
}

/// Five items, five providers, five categories: passes every sub-test.
pub fn diverse_pool() -> Vec<Box<dyn SourceProvider>> {
    vec![
        FixedProvider::boxed("twitter", vec![candidate("twitter", "llm", "LLM inference server")]),
        FixedProvider::boxed("producthunt", vec![candidate("producthunt", "photo", "Photo app for iOS")]),
        FixedProvider::boxed("hackernews", vec![candidate("hackernews", "cli", "CLI for structured logs")]),
        FixedProvider::boxed("reddit", vec![candidate("reddit", "paper", "Benchmark paper on caching")]),
        FixedProvider::boxed(
            "github_trending",
            vec![candidate("github_trending", "repo", "Self-hosted repository mirror")],
        ),
    ]
}

/// Ten items from two providers: the distribution sub-test can never pass.
pub fn two_provider_pool() -> Vec<Box<dyn SourceProvider>> {
    let hn = (0..5)
        .map(|i| candidate("hackernews", &format!("hn-{i}"), &format!("Compiler note {i}")))
        .collect();
    let rd = (0..5)
        .map(|i| candidate("reddit", &format!("rd-{i}"), &format!("Terminal tip {i}")))
        .collect();
    vec![FixedProvider::boxed("hackernews", hn), FixedProvider::boxed("reddit", rd)]
}

/// Text the test suite and the heuristic reviewer both score at the top.
pub fn strong_text(title: &str) -> String {
    let para = "It is a small engine that lets you cache API responses. It is written in \
                Rust and keeps memory at 40 MB under load. You can install it with cargo \
                install and configure it in one file. For example, when you run a busy \
                service it cuts latency compared to a plain proxy. Users report it is \
                stable for teams; however it only supports Linux today. ";
    format!("{title}. {}", para.repeat(4))
}

pub struct StrongGenerator;

#[async_trait]
impl Generator for StrongGenerator {
    async fn generate(&self, c: &Candidate, _hints: &OptimizationHints) -> Result<String> {
        Ok(strong_text(&c.title))
    }
    fn name(&self) -> &str {
        "strong"
    }
}

/// Short, vague text: fails density and scores low with the reviewer.
pub struct WeakGenerator;

#[async_trait]
impl Generator for WeakGenerator {
    async fn generate(&self, c: &Candidate, _hints: &OptimizationHints) -> Result<String> {
        Ok(format!("A quick look at {}.", c.title))
    }
    fn name(&self) -> &str {
        "weak"
    }
}

/// Records every delivered item; optionally fails for URLs containing a marker.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub delivered: Arc<Mutex<Vec<RenderedItem>>>,
    pub fail_marker: Option<String>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, item: &RenderedItem) -> Result<String> {
        if let Some(m) = &self.fail_marker {
            if item.candidate.url.contains(m.as_str()) {
                return Err(anyhow!("channel rejected the post"));
            }
        }
        self.delivered.lock().push(item.clone());
        Ok("200 OK".to_string())
    }
    fn name(&self) -> &str {
        "recording"
    }
}

pub struct Harness {
    pub tracker: Arc<NoveltyTracker>,
    pub ledger: Arc<Ledger>,
    pub publisher: RecordingPublisher,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            tracker: Arc::new(NoveltyTracker::in_memory()),
            ledger: Arc::new(Ledger::in_memory()),
            publisher: RecordingPublisher::default(),
        }
    }

    pub fn controller(
        &self,
        providers: Vec<Box<dyn SourceProvider>>,
        generator: Box<dyn Generator>,
    ) -> LoopController {
        self.controller_with(PipelineConfig::default(), providers, generator)
    }

    pub fn controller_with(
        &self,
        cfg: PipelineConfig,
        providers: Vec<Box<dyn SourceProvider>>,
        generator: Box<dyn Generator>,
    ) -> LoopController {
        LoopController::new(
            cfg,
            Collaborators {
                providers,
                generator,
                scorer: Box::new(HeuristicReviewer),
                publisher: Box::new(self.publisher.clone()),
            },
            self.tracker.clone(),
            self.ledger.clone(),
        )
    }

    pub fn delivered_urls(&self) -> Vec<String> {
        self.publisher
            .delivered
            .lock()
            .iter()
            .map(|i| i.candidate.url.clone())
            .collect()
    }
}
