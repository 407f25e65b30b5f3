use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Redirect from {url} to forbidden domain: {target}")]
    ForbiddenRedirect { url: String, target: String },

    #[error("Could not visit start page {url}: {reason}")]
    SeedFetch { url: String, reason: String },

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Short, low-cardinality label for the visit error counter.
    pub fn tag(&self) -> String {
        match self {
            ScanError::HttpStatus { status, .. } => reqwest::StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string()),
            ScanError::HttpError(e) if e.is_timeout() => "Request timed out".to_string(),
            ScanError::HttpError(_) => "Request failed".to_string(),
            ScanError::InvalidUrl(_) => "Invalid URL".to_string(),
            ScanError::ForbiddenRedirect { .. } => VisitRejection::ForbiddenDomain.reason().to_string(),
            ScanError::SeedFetch { .. } => "Start page failed".to_string(),
            ScanError::JoinError(_) | ScanError::Other(_) => "Internal error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Failure of the durable link store. "Not found" is never an error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed link row: {0}")]
    MalformedRow(String),
}

impl StorageError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Backend(Box::new(err))
    }
}

/// Expected outcomes of asking the frontier to accept a URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisitRejection {
    #[error("URL already visited")]
    AlreadyVisited,

    #[error("Max depth limit reached")]
    MaxDepth,

    #[error("Forbidden domain")]
    ForbiddenDomain,

    #[error("Invalid URL")]
    InvalidUrl,

    #[error("Crawl cancelled")]
    Cancelled,
}

impl VisitRejection {
    /// Stable tag value for the visit error counter.
    pub fn reason(&self) -> &'static str {
        match self {
            VisitRejection::AlreadyVisited => "URL already visited",
            VisitRejection::MaxDepth => "Max depth limit reached",
            VisitRejection::ForbiddenDomain => "Forbidden domain",
            VisitRejection::InvalidUrl => "Invalid URL",
            VisitRejection::Cancelled => "Crawl cancelled",
        }
    }
}
