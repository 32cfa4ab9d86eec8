pub mod error;
pub mod extractor;
pub mod graph;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod oracle;
pub mod orchestrator;
pub mod selector;
pub mod traits;

pub use error::{IngestError, OracleError, SearchError};
pub use extractor::{ExtractorConfig, TermExtractor};
pub use graph::{Edge, GraphNode, KnowledgeGraph, RelationKind};
pub use indexer::CollectionIndex;
pub use ingest::{
    discover_doc_files, load_page, load_pages_best_effort, page_source_id, parse_page,
    PageLoadReport, SkippedFile,
};
pub use models::{
    normalize_term, DomainTerm, IndexEntry, IndexResult, IndexStats, Page, QueryResponse,
    QueryStats, Selected, SelectionCriteria, SourceLocation, Term, TermHierarchy, TermKind,
    TerminologyMatches,
};
pub use oracle::HttpOracle;
pub use orchestrator::SearchOrchestrator;
pub use selector::TermSelector;
pub use traits::{TermOracle, TermRecord};
