use thiserror::Error;

/// Errors surfaced to callers of the search path. Only contract violations
/// reach the caller; not-found lookups are empty results and oracle
/// failures are recovered internally.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Errors from the page loader.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors internal to the language-model oracle client. Never propagated
/// past the extractor or selector; both fall back to heuristics.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from oracle: {0}")]
    Response(String),
}
