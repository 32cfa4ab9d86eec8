use crate::models::{normalize_term, Selected, SelectionCriteria, Term, TermKind};
use crate::traits::{TermOracle, TermRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const MATCH_WEIGHT: f64 = 0.7;
const CONFIDENCE_WEIGHT: f64 = 0.2;
const FREQUENCY_WEIGHT: f64 = 0.1;
const SUBSTRING_MATCH: f64 = 0.9;
const OVERLAP_CEILING: f64 = 0.4;

/// Heuristic relevance of a term text to a query.
///
/// Fixed weights: 0.7 lexical match, 0.2 stored confidence, 0.1
/// log-frequency boost. The lexical component is 1.0 for an exact
/// normalized match, 0.9 for a substring match, and at most 0.4 scaled by
/// token overlap otherwise, so any substring match (floor 0.63) outranks
/// any non-matching term (ceiling 0.58) regardless of frequency and
/// confidence.
pub fn heuristic_relevance(query: &str, text: &str, confidence: f64, frequency: u64) -> f64 {
    let query_norm = normalize_term(query);
    let text_norm = normalize_term(text);

    let lexical = if query_norm.is_empty() {
        0.0
    } else if text_norm == query_norm {
        1.0
    } else if text_norm.contains(&query_norm) || query_norm.contains(&text_norm) {
        SUBSTRING_MATCH
    } else {
        let query_tokens: Vec<&str> = query_norm.split(' ').collect();
        let shared = query_tokens
            .iter()
            .filter(|token| text_norm.contains(**token))
            .count();
        OVERLAP_CEILING * shared as f64 / query_tokens.len() as f64
    };

    let frequency_boost = ((1.0 + frequency as f64).ln() / 101f64.ln()).min(1.0);

    MATCH_WEIGHT * lexical
        + CONFIDENCE_WEIGHT * confidence.clamp(0.0, 1.0)
        + FREQUENCY_WEIGHT * frequency_boost
}

/// Picks a small, diverse, relevant subset out of a candidate pool,
/// consulting the relevance oracle when one is configured and falling
/// back to the heuristic formula for that call when it is not, errors,
/// or returns a malformed score vector.
pub struct TermSelector {
    oracle: Option<Arc<dyn TermOracle>>,
}

impl TermSelector {
    pub fn new(oracle: Option<Arc<dyn TermOracle>>) -> Self {
        Self { oracle }
    }

    pub async fn select<T>(
        &self,
        candidates: &[T],
        query: &str,
        criteria: &SelectionCriteria,
    ) -> Vec<Selected<T>>
    where
        T: TermRecord + Clone,
    {
        let filtered: Vec<&T> = candidates
            .iter()
            .filter(|candidate| candidate.confidence() >= criteria.min_confidence)
            .collect();

        if filtered.is_empty() {
            return Vec::new();
        }

        let oracle_scores = self.oracle_scores(&filtered, query).await;

        let mut scored: Vec<(f64, &T)> = filtered
            .iter()
            .enumerate()
            .map(|(position, candidate)| {
                let score = match &oracle_scores {
                    Some(scores) => scores[position],
                    None => heuristic_relevance(
                        query,
                        candidate.term_text(),
                        candidate.confidence(),
                        candidate.frequency(),
                    ),
                };
                (score, *candidate)
            })
            .collect();

        scored.sort_by(|(left_score, left), (right_score, right)| {
            right_score
                .total_cmp(left_score)
                .then_with(|| right.confidence().total_cmp(&left.confidence()))
                .then_with(|| left.term_text().cmp(right.term_text()))
        });

        let mut kind_counts: HashMap<TermKind, usize> = HashMap::new();
        let mut picked = Vec::new();

        for (score, candidate) in scored {
            let count = kind_counts.entry(candidate.kind()).or_insert(0);
            if *count >= criteria.max_per_kind {
                continue;
            }
            *count += 1;

            let rank = picked.len() + 1;
            picked.push(Selected {
                record: candidate.clone(),
                score,
                rank,
                reason: selection_reason(candidate, query),
            });

            if picked.len() >= criteria.max_terms {
                break;
            }
        }

        picked
    }

    /// One relevance score per candidate, or `None` when the oracle is
    /// absent or unusable for this call.
    async fn oracle_scores<T: TermRecord>(&self, candidates: &[&T], query: &str) -> Option<Vec<f64>> {
        let oracle = self.oracle.as_ref()?;
        let texts: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.term_text().to_string())
            .collect();

        match oracle.score_relevance(query, &texts).await {
            Ok(scores) if scores.len() == texts.len() => {
                Some(scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect())
            }
            Ok(scores) => {
                warn!(
                    expected = texts.len(),
                    received = scores.len(),
                    "relevance oracle returned a mismatched score vector; using heuristic scoring"
                );
                None
            }
            Err(error) => {
                warn!(%error, "relevance oracle failed; using heuristic scoring");
                None
            }
        }
    }

    /// Terms lexically similar to the target (token overlap, substring,
    /// matching kind, comparable length, shared source page), most
    /// similar first, target itself excluded.
    pub fn similar_terms(&self, target: &Term, all_terms: &[Term], limit: usize) -> Vec<Term> {
        let target_id = target.node_id();
        let target_norm = normalize_term(&target.text);
        let target_tokens: Vec<&str> = target_norm.split(' ').collect();

        let mut scored: Vec<(f64, &Term)> = all_terms
            .iter()
            .filter(|candidate| candidate.node_id() != target_id)
            .filter_map(|candidate| {
                let candidate_norm = normalize_term(&candidate.text);
                let mut score = 0.0;

                let shared_tokens = target_tokens
                    .iter()
                    .filter(|token| candidate_norm.split(' ').any(|other| other == **token))
                    .count();
                score += 0.3 * shared_tokens as f64;

                if candidate_norm.contains(&target_norm) || target_norm.contains(&candidate_norm) {
                    score += 0.2;
                }
                if candidate.kind == target.kind {
                    score += 0.2;
                }
                if candidate_norm.len().abs_diff(target_norm.len()) <= 3 {
                    score += 0.1;
                }
                if shares_source_page(target, candidate) {
                    score += 0.1;
                }

                (score > 0.0).then_some((score, candidate))
            })
            .collect();

        scored.sort_by(|(left_score, left), (right_score, right)| {
            right_score
                .total_cmp(left_score)
                .then_with(|| left.text.cmp(&right.text))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, term)| term.clone())
            .collect()
    }
}

fn selection_reason<T: TermRecord>(candidate: &T, query: &str) -> String {
    let query_norm = normalize_term(query);
    let text_norm = normalize_term(candidate.term_text());

    let reason = if text_norm == query_norm {
        "exact match for query"
    } else if text_norm.contains(&query_norm) {
        "contains query text"
    } else if candidate.confidence() > 0.8 {
        "high-confidence extraction"
    } else if candidate.frequency() > 3 {
        "frequently occurring term"
    } else {
        "relevant to query"
    };
    reason.to_string()
}

fn shares_source_page(left: &Term, right: &Term) -> bool {
    left.source_locations.iter().any(|location| {
        right
            .source_locations
            .iter()
            .any(|other| other.source_id == location.source_id)
    })
}
