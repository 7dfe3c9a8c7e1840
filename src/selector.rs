//! # Diversity-Constrained Selector
//!
//! Ranks novel candidates by heat score and admits a batch honoring a
//! per-provider cap. Pure and deterministic: the same input yields the same
//! ordered output.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::ingest::types::Candidate;
use crate::provider_weights::ProviderWeights;

pub const POPULARITY_FACTOR: f64 = 0.01;
pub const DISCUSSION_FACTOR: f64 = 0.02;
/// Heat subtracted from candidates whose rendering scored low last iteration.
pub const DEMOTION_PENALTY: f64 = 0.5;

/// Recency bonus in three discrete steps (1h / 6h / 24h).
pub fn recency_bonus(discovered_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now - discovered_at;
    if age < Duration::zero() || age <= Duration::hours(1) {
        0.3
    } else if age <= Duration::hours(6) {
        0.2
    } else if age <= Duration::hours(24) {
        0.1
    } else {
        0.0
    }
}

pub fn heat_score(c: &Candidate, weights: &ProviderWeights, now: DateTime<Utc>) -> f64 {
    weights.weight_for(&c.provider)
        + POPULARITY_FACTOR * c.popularity()
        + DISCUSSION_FACTOR * c.discussion()
        + recency_bonus(c.discovered_at, now)
}

#[derive(Debug, Clone, Copy)]
pub struct SelectParams {
    pub target_count: usize,
    pub per_provider_cap: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub heat: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Selection {
    pub items: Vec<ScoredCandidate>,
    /// Set when fewer than `target_count` candidates qualified.
    pub warning: Option<String>,
}

impl Selection {
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter().map(|s| &s.candidate)
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.items.into_iter().map(|s| s.candidate).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Selector {
    weights: ProviderWeights,
}

impl Selector {
    pub fn new(weights: ProviderWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ProviderWeights {
        &self.weights
    }

    pub fn select(&self, candidates: Vec<Candidate>, params: SelectParams) -> Selection {
        self.select_at(candidates, params, &HashSet::new(), Utc::now())
    }

    /// Sort by heat descending (stable, so ties keep input order), then admit
    /// while the provider's running count is below the cap.
    ///
    /// `demoted` holds candidate identities (canonical URLs) that lose
    /// [`DEMOTION_PENALTY`] heat.
    pub fn select_at(
        &self,
        candidates: Vec<Candidate>,
        params: SelectParams,
        demoted: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Selection {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|c| {
                let mut heat = heat_score(&c, &self.weights, now);
                if demoted.contains(c.identity()) {
                    heat -= DEMOTION_PENALTY;
                }
                ScoredCandidate { candidate: c, heat }
            })
            .collect();

        // sort_by is stable; total_cmp keeps NaN from breaking the order.
        scored.sort_by(|a, b| b.heat.total_cmp(&a.heat));

        let mut per_provider: BTreeMap<String, usize> = BTreeMap::new();
        let mut items = Vec::with_capacity(params.target_count);
        for sc in scored {
            if items.len() >= params.target_count {
                break;
            }
            let key = self.weights.canonical(&sc.candidate.provider);
            let n = per_provider.entry(key).or_insert(0);
            if *n >= params.per_provider_cap {
                continue;
            }
            *n += 1;
            items.push(sc);
        }

        let warning = (items.len() < params.target_count).then(|| {
            format!(
                "selected {} of {} targeted items (cap {} per provider)",
                items.len(),
                params.target_count,
                params.per_provider_cap
            )
        });
        if let Some(w) = &warning {
            tracing::warn!(target: "selector", "{w}");
        }

        Selection { items, warning }
    }
}
