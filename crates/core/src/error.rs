use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Raised by an `Analyzer` when it cannot make sense of a response body.
/// The orchestrator records it as an error of kind `parse` and keeps going.
#[derive(Error, Debug)]
#[error("parse error: {0}")]
pub struct ParseError(pub String);
