use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on retained source locations per term.
pub const SOURCE_LOCATION_CAP: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    TechnicalTerm,
    FunctionName,
    ClassName,
    MethodName,
    VariableName,
    Concept,
    Acronym,
    DomainSpecific,
}

impl TermKind {
    pub fn is_code_entity(self) -> bool {
        matches!(
            self,
            TermKind::FunctionName | TermKind::MethodName | TermKind::ClassName
        )
    }
}

/// Where a term was observed: one source page and a short excerpt around it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLocation {
    pub source_id: String,
    pub excerpt: String,
}

/// A candidate unit of domain vocabulary extracted from documentation.
///
/// `frequency` counts occurrences seen so far and only grows; the indexer
/// adds contributions from later pages on merge. `source_locations` keeps
/// the most recent [`SOURCE_LOCATION_CAP`] sightings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub text: String,
    pub kind: TermKind,
    pub confidence: f64,
    pub frequency: u64,
    pub definition: Option<String>,
    pub source_locations: Vec<SourceLocation>,
    /// Headings preceding this term on its source page, outermost first.
    /// Empty when the page position is unknown.
    pub heading_trail: Vec<String>,
}

impl Term {
    pub fn node_id(&self) -> String {
        normalize_term(&self.text)
    }
}

/// Canonical key for a term text: case-folded, whitespace-collapsed.
pub fn normalize_term(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One documentation page as supplied by the page source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub source_id: String,
    pub text: String,
    pub headings: Vec<String>,
    pub code_blocks: Vec<String>,
}

/// A merged, searchable projection of a [`Term`] within one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub term: Term,
    pub collection_id: String,
    pub indexed_at: DateTime<Utc>,
}

/// A term extracted by the language-model oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTerm {
    pub text: String,
    pub confidence: f64,
    pub definition: Option<String>,
}

/// Per-query selection thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub max_terms: usize,
    pub min_confidence: f64,
    pub max_per_kind: usize,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            max_terms: 10,
            min_confidence: 0.6,
            max_per_kind: 3,
        }
    }
}

/// A scored, ranked selection produced by the term selector.
#[derive(Debug, Clone, Serialize)]
pub struct Selected<T> {
    pub record: T,
    pub score: f64,
    pub rank: usize,
    pub reason: String,
}

/// Hierarchy and relations around one graph node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermHierarchy {
    pub parents: Vec<String>,
    pub children: Vec<String>,
    pub related: Vec<String>,
}

/// Result of a graph terminology search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminologyMatches {
    pub matches: Vec<String>,
    pub related: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResult {
    pub count_indexed: usize,
    pub collection_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_unique_terms: usize,
    pub total_collections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStats {
    pub collection_id: String,
    pub candidates_considered: usize,
    pub selected_count: usize,
}

/// Structured response for one query: the chosen terms, their graph
/// neighborhoods keyed by node id, and counters for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub selected: Vec<Selected<IndexEntry>>,
    pub hierarchy: HashMap<String, TermHierarchy>,
    pub stats: QueryStats,
}
