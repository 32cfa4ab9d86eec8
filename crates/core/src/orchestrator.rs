use crate::error::SearchError;
use crate::extractor::TermExtractor;
use crate::graph::KnowledgeGraph;
use crate::indexer::CollectionIndex;
use crate::models::{
    IndexResult, IndexStats, Page, QueryResponse, QueryStats, SelectionCriteria, Term,
    TermHierarchy, TerminologyMatches,
};
use crate::selector::TermSelector;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Minimum candidate pool handed to selection, regardless of how few
/// terms the caller asked for.
const MIN_CANDIDATE_POOL: usize = 20;

/// One collection's index and graph, mutated together under a single
/// lock so the two views never disagree.
struct CollectionUnit {
    index: CollectionIndex,
    graph: KnowledgeGraph,
}

/// Front door of the subsystem: extraction, indexing, graph upkeep, and
/// query-time selection behind one per-collection lock. Oracle calls are
/// awaited with no lock held.
pub struct SearchOrchestrator {
    extractor: TermExtractor,
    selector: TermSelector,
    collections: RwLock<HashMap<String, Arc<RwLock<CollectionUnit>>>>,
}

impl SearchOrchestrator {
    pub fn new(extractor: TermExtractor, selector: TermSelector) -> Self {
        Self {
            extractor,
            selector,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Extract terms from one page and fold them into the collection's
    /// index and knowledge graph. A page that yields no terms is a
    /// no-op and does not create the collection.
    pub async fn ingest(&self, page: &Page, collection_id: &str) -> Result<IndexResult, SearchError> {
        if collection_id.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "collection id must not be empty".to_string(),
            ));
        }

        let terms = self.extractor.extract(page).await?;
        if terms.is_empty() {
            return Ok(IndexResult {
                count_indexed: 0,
                collection_id: collection_id.to_string(),
            });
        }

        let unit = self.collection(collection_id, true).await;
        let unit = unit.ok_or_else(|| {
            SearchError::InvalidArgument(format!("collection {collection_id} unavailable"))
        })?;

        let mut guard = unit.write().await;
        let count_indexed = guard.index.index_terms(&terms);
        guard.graph.add_terms(&terms);

        debug!(
            collection = collection_id,
            source = page.source_id.as_str(),
            terms = count_indexed,
            "indexed page"
        );

        Ok(IndexResult {
            count_indexed,
            collection_id: collection_id.to_string(),
        })
    }

    /// Search one collection and select a ranked, kind-diverse subset,
    /// with each selected term's graph neighborhood attached.
    ///
    /// An unknown collection yields an empty response; only malformed
    /// input is an error.
    pub async fn query(
        &self,
        query_text: &str,
        collection_id: &str,
        criteria: &SelectionCriteria,
        expand_related: bool,
    ) -> Result<QueryResponse, SearchError> {
        if query_text.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }
        if collection_id.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "collection id must not be empty".to_string(),
            ));
        }

        let Some(unit) = self.collection(collection_id, false).await else {
            return Ok(empty_response(collection_id));
        };

        // Oversample so selection has room to filter and diversify.
        let pool_limit = (criteria.max_terms * 4).max(MIN_CANDIDATE_POOL);
        let candidates = {
            let guard = unit.read().await;
            guard.index.search(query_text, pool_limit)
        };
        let candidates_considered = candidates.len();

        let selected = self.selector.select(&candidates, query_text, criteria).await;

        let mut hierarchy = HashMap::new();
        {
            let guard = unit.read().await;
            for chosen in &selected {
                let node_id = chosen.record.term.node_id();
                if hierarchy.contains_key(&node_id) {
                    continue;
                }
                let mut neighborhood = guard.graph.get_term_hierarchy(&chosen.record.term.text);
                if !expand_related {
                    neighborhood.related.clear();
                }
                hierarchy.insert(node_id, neighborhood);
            }
        }

        Ok(QueryResponse {
            stats: QueryStats {
                collection_id: collection_id.to_string(),
                candidates_considered,
                selected_count: selected.len(),
            },
            selected,
            hierarchy,
        })
    }

    /// Graph-side terminology lookup: matching node texts plus their
    /// one-hop neighborhood.
    pub async fn terminology(
        &self,
        query_text: &str,
        collection_id: &str,
        expand_related: bool,
    ) -> Result<TerminologyMatches, SearchError> {
        if query_text.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }

        match self.collection(collection_id, false).await {
            Some(unit) => {
                let guard = unit.read().await;
                Ok(guard.graph.search_terminology(query_text, expand_related))
            }
            None => Ok(TerminologyMatches::default()),
        }
    }

    /// Full stored metadata for one term, or `None` when either the
    /// collection or the term is unknown.
    pub async fn get_term_details(&self, collection_id: &str, term_text: &str) -> Option<Term> {
        let unit = self.collection(collection_id, false).await?;
        let guard = unit.read().await;
        guard.index.get(term_text)
    }

    /// Related neighborhood of one stored term, empty when unknown.
    pub async fn get_term_hierarchy(
        &self,
        collection_id: &str,
        term_text: &str,
    ) -> TermHierarchy {
        match self.collection(collection_id, false).await {
            Some(unit) => {
                let guard = unit.read().await;
                guard.graph.get_term_hierarchy(term_text)
            }
            None => TermHierarchy::default(),
        }
    }

    pub async fn index_stats(&self) -> IndexStats {
        let collections = self.collections.read().await;
        let mut stats = IndexStats {
            total_unique_terms: 0,
            total_collections: collections.len(),
        };

        for unit in collections.values() {
            let guard = unit.read().await;
            stats.total_unique_terms += guard.index.unique_terms();
        }

        stats
    }

    /// Drop a collection and everything indexed under it. Returns
    /// whether the collection existed.
    pub async fn delete_collection(&self, collection_id: &str) -> bool {
        let removed = self.collections.write().await.remove(collection_id).is_some();
        if removed {
            debug!(collection = collection_id, "deleted collection");
        }
        removed
    }

    async fn collection(
        &self,
        collection_id: &str,
        create: bool,
    ) -> Option<Arc<RwLock<CollectionUnit>>> {
        {
            let collections = self.collections.read().await;
            if let Some(unit) = collections.get(collection_id) {
                return Some(unit.clone());
            }
        }

        if !create {
            return None;
        }

        let mut collections = self.collections.write().await;
        let unit = collections
            .entry(collection_id.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(CollectionUnit {
                    index: CollectionIndex::new(collection_id),
                    graph: KnowledgeGraph::new(),
                }))
            });
        Some(unit.clone())
    }
}

fn empty_response(collection_id: &str) -> QueryResponse {
    QueryResponse {
        selected: Vec::new(),
        hierarchy: HashMap::new(),
        stats: QueryStats {
            collection_id: collection_id.to_string(),
            candidates_considered: 0,
            selected_count: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractorConfig;

    fn orchestrator() -> SearchOrchestrator {
        let extractor =
            TermExtractor::new(ExtractorConfig::default(), None).expect("patterns compile");
        SearchOrchestrator::new(extractor, TermSelector::new(None))
    }

    fn docs_page() -> Page {
        Page {
            source_id: "auth-guide".to_string(),
            text: "The API (Application Programming Interface) issues session tokens. \
                   Use the login helper to start a session."
                .to_string(),
            headings: vec!["Authentication".to_string()],
            code_blocks: vec!["def login(user, password):\n    return session(user)".to_string()],
        }
    }

    #[tokio::test]
    async fn ingest_then_query_links_code_to_its_topic() {
        let orchestrator = orchestrator();
        let result = orchestrator.ingest(&docs_page(), "docs").await.unwrap();
        assert!(result.count_indexed > 0);

        let response = orchestrator
            .query("login", "docs", &SelectionCriteria::default(), true)
            .await
            .unwrap();

        assert!(!response.selected.is_empty());
        assert_eq!(response.selected[0].record.term.text, "login");
        assert_eq!(response.stats.selected_count, response.selected.len());

        let neighborhood = response
            .hierarchy
            .get("login")
            .expect("selected term has a hierarchy entry");
        assert!(neighborhood
            .related
            .iter()
            .any(|id| id == "authentication"));
    }

    #[tokio::test]
    async fn acronym_definition_is_stored_with_the_term() {
        let orchestrator = orchestrator();
        orchestrator.ingest(&docs_page(), "docs").await.unwrap();

        let details = orchestrator
            .get_term_details("docs", "API")
            .await
            .expect("acronym is indexed");
        assert_eq!(
            details.definition.as_deref(),
            Some("Application Programming Interface")
        );
    }

    #[tokio::test]
    async fn empty_page_is_a_noop_and_creates_no_collection() {
        let orchestrator = orchestrator();
        let empty = Page {
            source_id: "blank".to_string(),
            text: String::new(),
            headings: Vec::new(),
            code_blocks: Vec::new(),
        };

        let result = orchestrator.ingest(&empty, "docs").await.unwrap();
        assert_eq!(result.count_indexed, 0);

        let stats = orchestrator.index_stats().await;
        assert_eq!(stats.total_collections, 0);
    }

    #[tokio::test]
    async fn unknown_collection_queries_are_empty_not_errors() {
        let orchestrator = orchestrator();
        let response = orchestrator
            .query("login", "missing", &SelectionCriteria::default(), true)
            .await
            .unwrap();
        assert!(response.selected.is_empty());
        assert!(response.hierarchy.is_empty());

        let matches = orchestrator.terminology("login", "missing", true).await.unwrap();
        assert!(matches.matches.is_empty());

        assert!(orchestrator.get_term_details("missing", "login").await.is_none());
    }

    #[tokio::test]
    async fn blank_query_or_collection_is_rejected() {
        let orchestrator = orchestrator();
        let criteria = SelectionCriteria::default();

        assert!(matches!(
            orchestrator.query("  ", "docs", &criteria, true).await,
            Err(SearchError::InvalidArgument(_))
        ));
        assert!(matches!(
            orchestrator.query("login", "", &criteria, true).await,
            Err(SearchError::InvalidArgument(_))
        ));
        assert!(matches!(
            orchestrator.ingest(&docs_page(), " ").await,
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn expand_related_false_suppresses_related_ids() {
        let orchestrator = orchestrator();
        orchestrator.ingest(&docs_page(), "docs").await.unwrap();

        let response = orchestrator
            .query("login", "docs", &SelectionCriteria::default(), false)
            .await
            .unwrap();
        assert!(response
            .hierarchy
            .values()
            .all(|neighborhood| neighborhood.related.is_empty()));
    }

    #[tokio::test]
    async fn delete_collection_removes_it_from_stats() {
        let orchestrator = orchestrator();
        orchestrator.ingest(&docs_page(), "docs").await.unwrap();
        assert_eq!(orchestrator.index_stats().await.total_collections, 1);

        assert!(orchestrator.delete_collection("docs").await);
        assert!(!orchestrator.delete_collection("docs").await);
        assert_eq!(orchestrator.index_stats().await.total_collections, 0);
    }
}
