//! Rendering: the generation collaborator seam, rendered items, and the
//! fallback text used when generation fails.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::OptimizationHints;
use crate::error::PipelineError;
use crate::ingest::types::Candidate;

/// A candidate plus the prose generated for it in one iteration.
/// Regeneration produces a new item; text is never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedItem {
    pub candidate: Candidate,
    pub text: String,
    /// True when `text` came from [`fallback_text`].
    #[serde(default)]
    pub fallback: bool,
}

impl RenderedItem {
    pub fn trace_id(&self) -> &str {
        self.candidate.trace_id().unwrap_or("")
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Return rendered text for one candidate. Empty output counts as failure.
    async fn generate(&self, candidate: &Candidate, hints: &OptimizationHints) -> Result<String>;
    fn name(&self) -> &str;
}

/// Minimal rendering from structured fields, used when generation fails.
pub fn fallback_text(c: &Candidate) -> String {
    let mut out = c.title.clone();
    if !c.summary.is_empty() {
        out.push_str("\n\n");
        out.push_str(&c.summary);
    }
    out.push_str("\n\nSource: ");
    out.push_str(&c.url);
    out
}

#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub items: Vec<RenderedItem>,
    /// Failures that were dropped (fallback disabled).
    pub dropped: Vec<PipelineError>,
    /// Failures that were replaced by fallback text.
    pub fallbacks: Vec<PipelineError>,
}

/// Render each candidate in order. On failure either substitute the fallback
/// rendering or drop the candidate, depending on `use_fallback`.
pub async fn render_batch(
    generator: &dyn Generator,
    candidates: Vec<Candidate>,
    hints: &OptimizationHints,
    use_fallback: bool,
) -> RenderOutcome {
    let mut out = RenderOutcome::default();
    for c in candidates {
        let result = match generator.generate(&c, hints).await {
            Ok(text) if !text.trim().is_empty() => Ok(text),
            Ok(_) => Err(anyhow!("generator `{}` returned empty text", generator.name())),
            Err(e) => Err(e),
        };
        match result {
            Ok(text) => out.items.push(RenderedItem {
                candidate: c,
                text,
                fallback: false,
            }),
            Err(e) => {
                let err = PipelineError::Render {
                    trace_id: c.trace_id().unwrap_or_default().to_string(),
                    message: format!("{e:#}"),
                };
                tracing::warn!(target: "render", error = %err, "generation failed");
                if use_fallback {
                    counter!("pipeline_render_fallbacks_total").increment(1);
                    let text = fallback_text(&c);
                    out.items.push(RenderedItem {
                        candidate: c,
                        text,
                        fallback: true,
                    });
                    out.fallbacks.push(err);
                } else {
                    out.dropped.push(err);
                }
            }
        }
    }
    out
}

/// Offline generator: expands title and summary without any remote call.
/// Used for dry runs and when no API key is configured.
#[derive(Debug, Default, Clone)]
pub struct SummaryGenerator;

#[async_trait]
impl Generator for SummaryGenerator {
    async fn generate(&self, candidate: &Candidate, _hints: &OptimizationHints) -> Result<String> {
        let mut lines = vec![format!("{} ({})", candidate.title, candidate.provider)];
        if !candidate.summary.is_empty() {
            lines.push(candidate.summary.clone());
        }
        let signals = candidate
            .signals
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>();
        if !signals.is_empty() {
            lines.push(format!("Signals: {}", signals.join(", ")));
        }
        lines.push(format!("Link: {}", candidate.url));
        Ok(lines.join("\n\n"))
    }

    fn name(&self) -> &str {
        "summary"
    }
}

/// OpenAI-compatible Chat Completions generator. Requires an API key.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiGenerator {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";

    pub fn new(api_key: impl Into<String>, model: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("trend-gate/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// `OPENAI_API_KEY` (required), `OPENAI_MODEL`, `OPENAI_BASE_URL` (optional).
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
        let model = std::env::var("OPENAI_MODEL").ok();
        let mut g = Self::new(key, model.as_deref())?;
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            g.endpoint = format!("{}/chat/completions", base.trim_end_matches('/'));
        }
        Ok(g)
    }

    fn prompt(candidate: &Candidate, hints: &OptimizationHints) -> String {
        let mut p = format!(
            "Write a 250-500 word English post about this item.\nTitle: {}\nProvider: {}\nLink: {}\n",
            candidate.title, candidate.provider, candidate.url
        );
        if !candidate.summary.is_empty() {
            p.push_str(&format!("Summary: {}\n", candidate.summary));
        }
        p.push_str(
            "Say what it is and what it does, include one concrete technical detail, \
             how to start using it, a number, and one limitation.\n",
        );
        if !hints.strategies.is_empty() {
            p.push_str("Address these problems from the previous attempt:\n");
            for s in &hints.strategies {
                p.push_str(&format!("- {s}\n"));
            }
        }
        p
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, candidate: &Candidate, hints: &OptimizationHints) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        if self.api_key.is_empty() {
            return Err(anyhow!("openai: empty api key"));
        }

        let sys = "You write concise, factual posts for developers. No hype, no emojis, no numbered section headings.";
        let user = Self::prompt(candidate, hints);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.7,
            max_tokens: 900,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?
            .error_for_status()
            .context("openai status")?;
        let body: Resp = resp.json().await.context("openai response body")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(anyhow!("openai returned no content"));
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
