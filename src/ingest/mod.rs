// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::error::PipelineError;
use crate::ingest::types::{Candidate, SourceProvider};
use crate::tracker::canonicalize;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const SUMMARY_CAP: usize = 4000;
const TITLE_CAP: usize = 300;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let decoded = html_escape::decode_html_entities(s);

    // 2) Strip HTML tags
    let stripped = RE_TAGS.replace_all(&decoded, " ");

    // 3) Normalize typographic quotes to ASCII
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    RE_WS.replace_all(&quoted, " ").trim().to_string()
}

fn cap_chars(s: String, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s
    }
}

/// Normalize one candidate and enforce the boundary invariants:
/// an absolute http(s) URL, a non-empty title and a provider name.
pub fn validate(mut c: Candidate) -> Result<Candidate, PipelineError> {
    c.url = c.url.trim().to_string();
    c.provider = c.provider.trim().to_ascii_lowercase();
    c.title = cap_chars(normalize_text(&c.title), TITLE_CAP);
    c.summary = cap_chars(normalize_text(&c.summary), SUMMARY_CAP);
    c.signals.retain(|_, v| v.is_finite());

    if c.provider.is_empty() {
        return Err(PipelineError::Validation(format!("missing provider for {}", c.url)));
    }
    match url::Url::parse(&c.url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
        _ => {
            return Err(PipelineError::Validation(format!(
                "unusable url {:?} from {}",
                c.url, c.provider
            )))
        }
    }
    if c.title.is_empty() {
        return Err(PipelineError::Validation(format!("empty title for {}", c.url)));
    }

    c.canonical_url = canonicalize(&c.url);
    Ok(c)
}

/// Result of one boundary pass over raw provider output.
#[derive(Debug, Default)]
pub struct Intake {
    pub candidates: Vec<Candidate>,
    pub invalid: usize,
    pub pool_duplicates: usize,
}

/// Validate, normalize and collapse candidates sharing a canonical URL
/// (first seen wins). Order of the survivors is preserved.
pub fn normalize_validate_dedup(raw: Vec<Candidate>) -> Intake {
    let mut out = Intake {
        candidates: Vec::with_capacity(raw.len()),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for c in raw {
        let c = match validate(c) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(target: "ingest", error = %e, "candidate dropped");
                out.invalid += 1;
                continue;
            }
        };
        if !seen.insert(c.canonical_url.clone()) {
            out.pool_duplicates += 1;
            continue;
        }
        out.candidates.push(c);
    }
    out
}

/// Raw provider output plus the isolated per-provider failures.
#[derive(Debug, Default)]
pub struct Collected {
    pub raw: Vec<Candidate>,
    pub provider_errors: Vec<PipelineError>,
}

/// Ask every provider once. A failing provider is logged and counted, siblings continue.
pub async fn collect(providers: &[Box<dyn SourceProvider>]) -> Collected {
    crate::metrics::ensure_described();

    let mut out = Collected::default();
    for p in providers {
        match p.discover().await {
            Ok(mut v) => {
                tracing::debug!(target: "ingest", provider = p.name(), count = v.len(), "provider returned");
                out.raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                counter!("pipeline_provider_errors_total").increment(1);
                out.provider_errors.push(PipelineError::Provider {
                    provider: p.name().to_string(),
                    message: format!("{e:#}"),
                });
            }
        }
    }
    counter!("pipeline_candidates_total").increment(out.raw.len() as u64);
    out
}

/// Collect from all providers and run the boundary pass.
pub async fn run_once(providers: &[Box<dyn SourceProvider>]) -> (Intake, Vec<PipelineError>) {
    let collected = collect(providers).await;
    let intake = normalize_validate_dedup(collected.raw);

    counter!("pipeline_invalid_total").increment(intake.invalid as u64);
    counter!("pipeline_duplicates_total").increment(intake.pool_duplicates as u64);

    (intake, collected.provider_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn c(provider: &str, url: &str, title: &str) -> Candidate {
        Candidate::new(provider, url, title, Utc::now())
    }

    #[test]
    fn normalize_text_decodes_and_collapses() {
        let s = "  <p>Fast&nbsp;&amp;  <b>safe</b></p>\n\n \u{201C}async\u{201D} ";
        assert_eq!(normalize_text(s), "Fast & safe \"async\"");
    }

    #[test]
    fn validate_rejects_bad_urls_and_titles() {
        assert!(validate(c("reddit", "", "T")).is_err());
        assert!(validate(c("reddit", "ftp://a.dev/x", "T")).is_err());
        assert!(validate(c("reddit", "not a url", "T")).is_err());
        assert!(validate(c("reddit", "https://a.dev/x", " <br/> ")).is_err());
        assert!(validate(c("  ", "https://a.dev/x", "T")).is_err());

        let ok = validate(c(" Reddit ", "https://a.dev/x?utm_source=r", "T")).unwrap();
        assert_eq!(ok.provider, "reddit");
        assert_eq!(ok.canonical_url, "https://a.dev/x");
    }

    #[test]
    fn pool_dedup_keeps_first_seen() {
        let raw = vec![
            c("hackernews", "https://a.dev/x?ref=hn", "First"),
            c("reddit", "https://a.dev/x", "Second"),
            c("reddit", "https://a.dev/y", "Third"),
            c("reddit", "", "Broken"),
        ];
        let intake = normalize_validate_dedup(raw);
        let titles: Vec<_> = intake.candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Third"]);
        assert_eq!(intake.pool_duplicates, 1);
        assert_eq!(intake.invalid, 1);
    }
}
