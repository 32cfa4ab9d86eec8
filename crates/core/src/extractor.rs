use crate::error::SearchError;
use crate::models::{normalize_term, Page, SourceLocation, Term, TermKind, SOURCE_LOCATION_CAP};
use crate::traits::TermOracle;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Words too common to be worth indexing as terminology.
const STOPWORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "this", "that",
    "these", "those", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "can", "may", "might", "must", "shall", "use",
    "used", "using", "example", "note", "important", "see", "also", "more", "like", "just", "only",
    "very",
];

/// Headings too generic to count as concepts.
const GENERIC_HEADINGS: &[&str] = &[
    "introduction",
    "overview",
    "summary",
    "contents",
    "index",
    "see also",
    "references",
    "links",
    "related",
    "more information",
    "getting started",
    "installation",
    "setup",
    "configuration",
    "usage",
    "examples",
    "api reference",
];

const EXCERPT_CONTEXT_CHARS: usize = 60;

const CASE_PATTERN_CONFIDENCE: f64 = 0.7;
const DECLARATION_CONFIDENCE: f64 = 0.9;
const ACRONYM_CONFIDENCE: f64 = 0.95;
const HEADING_CONFIDENCE: f64 = 0.8;
const EMPHASIS_CONFIDENCE: f64 = 0.6;
const ORACLE_CONFIDENCE_FLOOR: f64 = 0.6;
const ORACLE_CONFIDENCE_CEILING: f64 = 0.95;

#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    /// Highest-confidence terms kept per page.
    pub max_terms_per_page: usize,
    /// Characters of page text handed to the oracle.
    pub oracle_text_limit: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_terms_per_page: 30,
            oracle_text_limit: 2_000,
        }
    }
}

/// Turns one documentation page into a deduplicated batch of term
/// candidates using pattern rules, with an optional oracle pass for
/// domain vocabulary the patterns miss.
pub struct TermExtractor {
    config: ExtractorConfig,
    oracle: Option<Arc<dyn TermOracle>>,
    pascal_case: Regex,
    camel_case: Regex,
    snake_case: Regex,
    acronym: Regex,
    emphasis: Regex,
    declaration: Regex,
}

impl TermExtractor {
    pub fn new(
        config: ExtractorConfig,
        oracle: Option<Arc<dyn TermOracle>>,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            config,
            oracle,
            pascal_case: Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b")?,
            camel_case: Regex::new(r"\b[a-z]+(?:[A-Z][a-z0-9]*)+\b")?,
            snake_case: Regex::new(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b")?,
            acronym: Regex::new(r"\b([A-Z]{2,6})\s*\(([^)]+)\)")?,
            emphasis: Regex::new(r"\*\*([^*\n]+)\*\*")?,
            declaration: Regex::new(
                r"(?m)^([ \t]*)(?:pub\s+|async\s+|export\s+)*(def|fn|function|class|struct)\s+([A-Za-z_][A-Za-z0-9_]*)",
            )?,
        })
    }

    /// Extract candidate terms from one page. Malformed content degrades
    /// to fewer terms; a page with no content yields an empty batch. The
    /// only hard failure is a missing `source_id`.
    pub async fn extract(&self, page: &Page) -> Result<Vec<Term>, SearchError> {
        if page.source_id.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "page is missing a source_id".to_string(),
            ));
        }

        if page.text.trim().is_empty() && page.headings.is_empty() && page.code_blocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = PageBatch::default();

        self.collect_code_declarations(page, &mut batch);
        self.collect_case_patterns(page, &mut batch);
        self.collect_acronyms(page, &mut batch);
        self.collect_concepts(page, &mut batch);

        if let Some(oracle) = &self.oracle {
            let snippet = truncate_chars(&page.text, self.config.oracle_text_limit);
            match oracle.extract_domain_terms(snippet).await {
                Ok(domain_terms) => {
                    for found in domain_terms {
                        let confidence = found
                            .confidence
                            .clamp(ORACLE_CONFIDENCE_FLOOR, ORACLE_CONFIDENCE_CEILING);
                        if let Some(mut term) = candidate(
                            page,
                            &found.text,
                            TermKind::DomainSpecific,
                            confidence,
                            snippet,
                        ) {
                            term.definition = found.definition.filter(|d| !d.trim().is_empty());
                            batch.push(term);
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, source_id = %page.source_id, "domain term oracle failed; keeping pattern-rule terms");
                }
            }
        }

        let terms = batch.into_ranked(self.config.max_terms_per_page);
        debug!(
            source_id = %page.source_id,
            term_count = terms.len(),
            "extracted terms from page"
        );
        Ok(terms)
    }

    fn collect_case_patterns(&self, page: &Page, batch: &mut PageBatch) {
        let mut scan = |content: &str| {
            for pattern in [&self.pascal_case, &self.camel_case, &self.snake_case] {
                for found in pattern.find_iter(content) {
                    let excerpt = excerpt_around(content, found.start(), found.end());
                    if let Some(term) = candidate(
                        page,
                        found.as_str(),
                        TermKind::TechnicalTerm,
                        CASE_PATTERN_CONFIDENCE,
                        &excerpt,
                    ) {
                        batch.push(term);
                    }
                }
            }
        };

        scan(&page.text);
        for block in &page.code_blocks {
            scan(block);
        }
    }

    fn collect_code_declarations(&self, page: &Page, batch: &mut PageBatch) {
        for block in &page.code_blocks {
            for capture in self.declaration.captures_iter(block) {
                let indent = capture.get(1).map_or("", |m| m.as_str());
                let keyword = capture.get(2).map_or("", |m| m.as_str());
                let name = match capture.get(3) {
                    Some(name) => name,
                    None => continue,
                };

                let kind = match keyword {
                    "class" | "struct" => TermKind::ClassName,
                    // An indented declaration sits inside an enclosing type.
                    _ if !indent.is_empty() => TermKind::MethodName,
                    _ => TermKind::FunctionName,
                };

                let excerpt = excerpt_around(block, name.start(), name.end());
                if let Some(term) =
                    candidate(page, name.as_str(), kind, DECLARATION_CONFIDENCE, &excerpt)
                {
                    batch.push(term);
                }
            }
        }
    }

    fn collect_acronyms(&self, page: &Page, batch: &mut PageBatch) {
        for capture in self.acronym.captures_iter(&page.text) {
            let (acronym, expansion) = match (capture.get(1), capture.get(2)) {
                (Some(acronym), Some(expansion)) => (acronym, expansion),
                _ => continue,
            };

            let excerpt = excerpt_around(&page.text, acronym.start(), expansion.end());
            if let Some(mut term) = candidate(
                page,
                acronym.as_str(),
                TermKind::Acronym,
                ACRONYM_CONFIDENCE,
                &excerpt,
            ) {
                term.definition = Some(expansion.as_str().trim().to_string());
                batch.push(term);
            }
        }
    }

    fn collect_concepts(&self, page: &Page, batch: &mut PageBatch) {
        let cleaned: Vec<String> = page
            .headings
            .iter()
            .map(|heading| heading.trim_start_matches('#').trim().to_string())
            .collect();

        for (position, heading) in cleaned.iter().enumerate() {
            if heading.is_empty() || GENERIC_HEADINGS.contains(&heading.to_lowercase().as_str()) {
                continue;
            }
            if let Some(mut term) = candidate(
                page,
                heading,
                TermKind::Concept,
                HEADING_CONFIDENCE,
                heading,
            ) {
                term.heading_trail = cleaned[..position]
                    .iter()
                    .filter(|h| !h.is_empty())
                    .cloned()
                    .collect();
                batch.push(term);
            }
        }

        for capture in self.emphasis.captures_iter(&page.text) {
            if let Some(span) = capture.get(1) {
                let excerpt = excerpt_around(&page.text, span.start(), span.end());
                if let Some(term) = candidate(
                    page,
                    span.as_str(),
                    TermKind::Concept,
                    EMPHASIS_CONFIDENCE,
                    &excerpt,
                ) {
                    batch.push(term);
                }
            }
        }
    }
}

/// Build one candidate term, or `None` when the surface string is too
/// short or a stopword after trimming surrounding punctuation.
fn candidate(
    page: &Page,
    raw_text: &str,
    kind: TermKind,
    confidence: f64,
    excerpt: &str,
) -> Option<Term> {
    let text = raw_text.trim_matches(|c: char| !c.is_alphanumeric());
    if text.chars().count() < 2 {
        return None;
    }

    let normalized = normalize_term(text);
    if STOPWORDS.contains(&normalized.as_str()) {
        return None;
    }

    Some(Term {
        text: text.to_string(),
        kind,
        confidence,
        frequency: 1,
        definition: None,
        source_locations: vec![SourceLocation {
            source_id: page.source_id.clone(),
            excerpt: truncate_chars(excerpt, 160).to_string(),
        }],
        heading_trail: Vec::new(),
    })
}

fn excerpt_around(content: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(EXCERPT_CONTEXT_CHARS);
    while from > 0 && !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = end.saturating_add(EXCERPT_CONTEXT_CHARS).min(content.len());
    while to < content.len() && !content.is_char_boundary(to) {
        to += 1;
    }
    content[from..to]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

/// Accumulates within-page candidates, merging duplicates by normalized
/// text while preserving first-seen order for stable tie-breaks.
#[derive(Default)]
struct PageBatch {
    order: Vec<String>,
    terms: HashMap<String, Term>,
}

impl PageBatch {
    fn push(&mut self, term: Term) {
        let key = term.node_id();
        match self.terms.get_mut(&key) {
            Some(existing) => {
                existing.frequency += 1;
                if term.confidence > existing.confidence {
                    existing.confidence = term.confidence;
                    existing.kind = term.kind;
                }
                if existing.definition.is_none() {
                    existing.definition = term.definition;
                }
                if existing.heading_trail.is_empty() {
                    existing.heading_trail = term.heading_trail;
                }
                for location in term.source_locations {
                    if !existing.source_locations.contains(&location) {
                        existing.source_locations.push(location);
                    }
                }
                if existing.source_locations.len() > SOURCE_LOCATION_CAP {
                    let excess = existing.source_locations.len() - SOURCE_LOCATION_CAP;
                    existing.source_locations.drain(..excess);
                }
            }
            None => {
                self.order.push(key.clone());
                self.terms.insert(key, term);
            }
        }
    }

    fn into_ranked(mut self, cap: usize) -> Vec<Term> {
        let mut terms: Vec<Term> = self
            .order
            .iter()
            .filter_map(|key| self.terms.remove(key))
            .collect();
        // Stable sort keeps first-seen order for equal confidence.
        terms.sort_by(|left, right| right.confidence.total_cmp(&left.confidence));
        terms.truncate(cap);
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::models::DomainTerm;
    use async_trait::async_trait;

    fn page(text: &str, headings: &[&str], code_blocks: &[&str]) -> Page {
        Page {
            source_id: "page-1".to_string(),
            text: text.to_string(),
            headings: headings.iter().map(|h| h.to_string()).collect(),
            code_blocks: code_blocks.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn extractor() -> TermExtractor {
        TermExtractor::new(ExtractorConfig::default(), None).expect("patterns should compile")
    }

    fn find<'a>(terms: &'a [Term], text: &str) -> Option<&'a Term> {
        terms
            .iter()
            .find(|t| normalize_term(&t.text) == normalize_term(text))
    }

    #[tokio::test]
    async fn empty_page_yields_no_terms() {
        let terms = extractor()
            .extract(&page("", &[], &[]))
            .await
            .expect("empty page is not an error");
        assert!(terms.is_empty());
    }

    #[tokio::test]
    async fn missing_source_id_is_a_contract_violation() {
        let mut bad = page("some text", &[], &[]);
        bad.source_id = "  ".to_string();
        assert!(extractor().extract(&bad).await.is_err());
    }

    #[tokio::test]
    async fn case_patterns_become_technical_terms() {
        let terms = extractor()
            .extract(&page(
                "Configure the EventLoop via runLoop or max_retries.",
                &[],
                &[],
            ))
            .await
            .expect("extraction succeeds");

        for text in ["EventLoop", "runLoop", "max_retries"] {
            let term = find(&terms, text).expect("pattern term extracted");
            assert_eq!(term.kind, TermKind::TechnicalTerm);
        }
    }

    #[tokio::test]
    async fn declarations_win_over_case_patterns() {
        let code = "def login(user, password):\n    return check_credentials(user)\n";
        let terms = extractor()
            .extract(&page("", &[], &[code]))
            .await
            .expect("extraction succeeds");

        let login = find(&terms, "login").expect("declared function extracted");
        assert_eq!(login.kind, TermKind::FunctionName);
        assert!(login.confidence >= DECLARATION_CONFIDENCE);

        let class_code = "class Session:\n    def refresh(self):\n        pass\n";
        let terms = extractor()
            .extract(&page("", &[], &[class_code]))
            .await
            .expect("extraction succeeds");
        assert_eq!(
            find(&terms, "Session").expect("class extracted").kind,
            TermKind::ClassName
        );
        assert_eq!(
            find(&terms, "refresh").expect("method extracted").kind,
            TermKind::MethodName
        );
    }

    #[tokio::test]
    async fn acronyms_carry_their_expansion_as_definition() {
        let terms = extractor()
            .extract(&page(
                "Use the API (Application Programming Interface) to integrate.",
                &[],
                &[],
            ))
            .await
            .expect("extraction succeeds");

        let acronym = find(&terms, "API").expect("acronym extracted");
        assert_eq!(acronym.kind, TermKind::Acronym);
        assert_eq!(
            acronym.definition.as_deref(),
            Some("Application Programming Interface")
        );
    }

    #[tokio::test]
    async fn headings_become_concepts_with_trail_and_generic_ones_are_skipped() {
        let terms = extractor()
            .extract(&page(
                "Body text with **replica set** emphasis.",
                &["Replication", "Overview", "Failover"],
                &[],
            ))
            .await
            .expect("extraction succeeds");

        assert_eq!(
            find(&terms, "Replication").expect("heading concept").kind,
            TermKind::Concept
        );
        assert!(find(&terms, "Overview").is_none());
        let failover = find(&terms, "Failover").expect("heading concept");
        assert_eq!(failover.heading_trail, vec!["Replication", "Overview"]);
        assert_eq!(
            find(&terms, "replica set").expect("emphasis concept").kind,
            TermKind::Concept
        );
    }

    #[tokio::test]
    async fn short_tokens_and_stopwords_are_discarded() {
        let terms = extractor()
            .extract(&page("**a** **the** **ok**", &[], &[]))
            .await
            .expect("extraction succeeds");
        assert!(find(&terms, "a").is_none());
        assert!(find(&terms, "the").is_none());
        assert!(find(&terms, "ok").is_some());
    }

    #[tokio::test]
    async fn page_cap_keeps_highest_confidence_terms() {
        let config = ExtractorConfig {
            max_terms_per_page: 2,
            ..Default::default()
        };
        let extractor = TermExtractor::new(config, None).expect("patterns should compile");
        let terms = extractor
            .extract(&page(
                "someValue otherValue thirdValue API (Application Programming Interface)",
                &["Sharding"],
                &[],
            ))
            .await
            .expect("extraction succeeds");

        assert_eq!(terms.len(), 2);
        assert!(find(&terms, "API").is_some());
        assert!(find(&terms, "Sharding").is_some());
    }

    struct FailingOracle;

    #[async_trait]
    impl TermOracle for FailingOracle {
        async fn extract_domain_terms(&self, _text: &str) -> Result<Vec<DomainTerm>, OracleError> {
            Err(OracleError::Response("boom".to_string()))
        }

        async fn score_relevance(
            &self,
            _query: &str,
            _candidates: &[String],
        ) -> Result<Vec<f64>, OracleError> {
            Err(OracleError::Response("boom".to_string()))
        }
    }

    struct StubOracle;

    #[async_trait]
    impl TermOracle for StubOracle {
        async fn extract_domain_terms(&self, _text: &str) -> Result<Vec<DomainTerm>, OracleError> {
            Ok(vec![DomainTerm {
                text: "write concern".to_string(),
                confidence: 1.0,
                definition: Some("durability guarantee level".to_string()),
            }])
        }

        async fn score_relevance(
            &self,
            _query: &str,
            candidates: &[String],
        ) -> Result<Vec<f64>, OracleError> {
            Ok(vec![0.5; candidates.len()])
        }
    }

    #[tokio::test]
    async fn oracle_failure_leaves_pattern_terms_intact() {
        let extractor =
            TermExtractor::new(ExtractorConfig::default(), Some(Arc::new(FailingOracle)))
                .expect("patterns should compile");
        let terms = extractor
            .extract(&page("The EventLoop drives execution.", &[], &[]))
            .await
            .expect("oracle failure is not an extraction failure");
        assert!(find(&terms, "EventLoop").is_some());
    }

    #[tokio::test]
    async fn oracle_terms_are_clamped_into_their_band() {
        let extractor = TermExtractor::new(ExtractorConfig::default(), Some(Arc::new(StubOracle)))
            .expect("patterns should compile");
        let terms = extractor
            .extract(&page("Replica sets and write concern.", &[], &[]))
            .await
            .expect("extraction succeeds");

        let domain = find(&terms, "write concern").expect("oracle term extracted");
        assert_eq!(domain.kind, TermKind::DomainSpecific);
        assert!(domain.confidence <= ORACLE_CONFIDENCE_CEILING);
        assert_eq!(domain.definition.as_deref(), Some("durability guarantee level"));
    }
}
