use crate::error::OracleError;
use crate::models::{DomainTerm, IndexEntry, Term, TermKind};
use async_trait::async_trait;

/// Minimal shape the selector needs: raw terms and index entries both
/// qualify, so selection does not care which side of the indexer a
/// candidate came from.
pub trait TermRecord {
    fn term_text(&self) -> &str;
    fn kind(&self) -> TermKind;
    fn confidence(&self) -> f64;
    fn frequency(&self) -> u64;
}

impl TermRecord for Term {
    fn term_text(&self) -> &str {
        &self.text
    }

    fn kind(&self) -> TermKind {
        self.kind
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }
}

impl TermRecord for IndexEntry {
    fn term_text(&self) -> &str {
        &self.term.text
    }

    fn kind(&self) -> TermKind {
        self.term.kind
    }

    fn confidence(&self) -> f64 {
        self.term.confidence
    }

    fn frequency(&self) -> u64 {
        self.term.frequency
    }
}

/// Optional language-model collaborator. Every call site must have a
/// complete non-oracle branch; an error here is recovered locally and
/// never surfaced as a failure of extraction or selection.
#[async_trait]
pub trait TermOracle: Send + Sync {
    /// Extract domain-specific vocabulary the pattern rules miss.
    async fn extract_domain_terms(&self, text: &str) -> Result<Vec<DomainTerm>, OracleError>;

    /// Score each candidate's relevance to the query in `[0, 1]`, one
    /// score per candidate, in order.
    async fn score_relevance(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<f64>, OracleError>;
}
