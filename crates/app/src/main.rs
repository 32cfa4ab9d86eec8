use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use term_search_core::{
    load_pages_best_effort, ExtractorConfig, HttpOracle, SearchOrchestrator, SelectionCriteria,
    TermExtractor, TermOracle, TermSelector,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "term-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Term oracle base URL; heuristics-only when unset.
    #[arg(long, env = "TERM_ORACLE_ENDPOINT")]
    oracle_endpoint: Option<String>,

    /// Bearer token for the term oracle.
    #[arg(long, env = "TERM_ORACLE_API_KEY")]
    oracle_api_key: Option<String>,

    /// Timeout for oracle requests, in seconds.
    #[arg(long, default_value = "30")]
    oracle_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and index terminology from a documentation folder.
    Ingest {
        /// Folder containing .md/.markdown/.txt files, searched recursively.
        #[arg(long)]
        folder: String,
        /// Collection to index into.
        #[arg(long, default_value = "default")]
        collection: String,
    },
    /// Ingest a folder, then search its terminology.
    Search {
        /// Folder containing documentation to index first.
        #[arg(long)]
        folder: String,
        /// Search query
        #[arg(long)]
        query: String,
        /// Collection to index into and search.
        #[arg(long, default_value = "default")]
        collection: String,
        /// Maximum number of terms to return.
        #[arg(long, default_value = "10")]
        max_terms: usize,
        /// Minimum extraction confidence for a candidate.
        #[arg(long, default_value = "0.6")]
        min_confidence: f64,
        /// Maximum results sharing one term kind.
        #[arg(long, default_value = "3")]
        max_per_kind: usize,
        /// Skip the related-term graph expansion.
        #[arg(long, default_value_t = false)]
        no_expand: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let oracle: Option<Arc<dyn TermOracle>> = match &cli.oracle_endpoint {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            let oracle = HttpOracle::new(
                endpoint,
                cli.oracle_api_key.clone(),
                Duration::from_secs(cli.oracle_timeout_secs),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            Some(Arc::new(oracle))
        }
        _ => None,
    };

    let extractor = TermExtractor::new(ExtractorConfig::default(), oracle.clone())
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let selector = TermSelector::new(oracle.clone());
    let orchestrator = SearchOrchestrator::new(extractor, selector);

    info!(
        version = app_version,
        oracle = oracle.is_some(),
        started_at = %Utc::now().to_rfc3339(),
        "term-search boot"
    );

    match cli.command {
        Command::Ingest { folder, collection } => {
            let indexed = ingest_folder(&orchestrator, &folder, &collection).await?;
            let stats = orchestrator.index_stats().await;
            println!(
                "{indexed} terms indexed into collection {collection} ({} unique terms total)",
                stats.total_unique_terms
            );
        }
        Command::Search {
            folder,
            query,
            collection,
            max_terms,
            min_confidence,
            max_per_kind,
            no_expand,
        } => {
            ingest_folder(&orchestrator, &folder, &collection).await?;

            let criteria = SelectionCriteria {
                max_terms,
                min_confidence,
                max_per_kind,
            };
            let response = orchestrator
                .query(&query, &collection, &criteria, !no_expand)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "query: {query} ({} candidates, {} selected)",
                response.stats.candidates_considered, response.stats.selected_count
            );

            for selected in &response.selected {
                let term = &selected.record.term;
                println!(
                    "[{}] score={:.4} kind={:?} freq={} confidence={:.2} {}",
                    selected.rank, selected.score, term.kind, term.frequency, term.confidence,
                    term.text
                );
                println!("  reason={}", selected.reason);
                if let Some(definition) = &term.definition {
                    println!("  definition={definition}");
                }

                if let Some(neighborhood) = response.hierarchy.get(&term.node_id()) {
                    if !neighborhood.parents.is_empty() {
                        println!("  parents={}", neighborhood.parents.join(", "));
                    }
                    if !neighborhood.children.is_empty() {
                        println!("  children={}", neighborhood.children.join(", "));
                    }
                    if !neighborhood.related.is_empty() {
                        println!("  related={}", neighborhood.related.join(", "));
                    }
                }
            }
        }
    }

    Ok(())
}

async fn ingest_folder(
    orchestrator: &SearchOrchestrator,
    folder: &str,
    collection: &str,
) -> anyhow::Result<usize> {
    let report = load_pages_best_effort(Path::new(folder))
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            folder
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }
    }

    info!(folder = folder, page_count = report.pages.len(), "ingesting pages");

    let mut indexed = 0usize;
    for page in &report.pages {
        let result = orchestrator
            .ingest(page, collection)
            .await
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        indexed += result.count_indexed;
    }

    Ok(indexed)
}
