use crate::models::{normalize_term, IndexEntry, Term, SOURCE_LOCATION_CAP};
use chrono::Utc;
use std::collections::HashMap;

/// How strongly an entry matches a query, strongest last so the derived
/// ordering ranks exact above prefix above general substring matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum MatchStrength {
    Substring,
    Prefix,
    Exact,
}

/// Classify `text` against `query`; both must already be normalized.
pub(crate) fn match_strength(query: &str, text: &str) -> Option<MatchStrength> {
    if text == query {
        Some(MatchStrength::Exact)
    } else if text.starts_with(query) {
        Some(MatchStrength::Prefix)
    } else if text.contains(query) {
        Some(MatchStrength::Substring)
    } else {
        None
    }
}

/// One collection's searchable term entries, keyed by normalized text.
///
/// Entries are merged projections: re-indexing the same text adds its
/// frequency contribution (seeing a page again is additive by design),
/// keeps the higher confidence, and fills a missing definition.
pub struct CollectionIndex {
    collection_id: String,
    entries: HashMap<String, IndexEntry>,
}

impl CollectionIndex {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            entries: HashMap::new(),
        }
    }

    pub fn unique_terms(&self) -> usize {
        self.entries.len()
    }

    /// Upsert a batch of extracted terms. Returns how many terms were
    /// applied (merges included).
    pub fn index_terms(&mut self, terms: &[Term]) -> usize {
        let now = Utc::now();

        for term in terms {
            let key = term.node_id();
            match self.entries.get_mut(&key) {
                Some(entry) => {
                    merge_term(&mut entry.term, term);
                    entry.indexed_at = now;
                }
                None => {
                    let mut stored = term.clone();
                    cap_source_locations(&mut stored);
                    self.entries.insert(
                        key,
                        IndexEntry {
                            term: stored,
                            collection_id: self.collection_id.clone(),
                            indexed_at: now,
                        },
                    );
                }
            }
        }

        terms.len()
    }

    /// Case-insensitive substring search, exact matches first, then
    /// prefix, then general substring; ties broken by descending
    /// frequency, then descending confidence, then text.
    pub fn search(&self, query: &str, limit: usize) -> Vec<IndexEntry> {
        let normalized_query = normalize_term(query);
        if normalized_query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<(MatchStrength, &IndexEntry)> = self
            .entries
            .iter()
            .filter_map(|(key, entry)| {
                match_strength(&normalized_query, key).map(|strength| (strength, entry))
            })
            .collect();

        hits.sort_by(|(left_strength, left), (right_strength, right)| {
            right_strength
                .cmp(left_strength)
                .then_with(|| right.term.frequency.cmp(&left.term.frequency))
                .then_with(|| right.term.confidence.total_cmp(&left.term.confidence))
                .then_with(|| left.term.text.cmp(&right.term.text))
        });

        hits.into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Full metadata for one term, or `None` when the text is unknown.
    pub fn get(&self, term_text: &str) -> Option<Term> {
        self.entries
            .get(&normalize_term(term_text))
            .map(|entry| entry.term.clone())
    }
}

fn merge_term(existing: &mut Term, incoming: &Term) {
    existing.frequency += incoming.frequency;
    if incoming.confidence > existing.confidence {
        existing.confidence = incoming.confidence;
        existing.kind = incoming.kind;
    }
    if existing.definition.is_none() {
        existing.definition = incoming.definition.clone();
    }
    if existing.heading_trail.is_empty() {
        existing.heading_trail = incoming.heading_trail.clone();
    }
    for location in &incoming.source_locations {
        if !existing.source_locations.contains(location) {
            existing.source_locations.push(location.clone());
        }
    }
    cap_source_locations(existing);
}

fn cap_source_locations(term: &mut Term) {
    if term.source_locations.len() > SOURCE_LOCATION_CAP {
        let excess = term.source_locations.len() - SOURCE_LOCATION_CAP;
        term.source_locations.drain(..excess);
    }
}
