use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ParseError;

/// How a page was classified by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Article,
    Nav,
    Other,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Article => "article",
            Classification::Nav => "nav",
            Classification::Other => "other",
        }
    }
}

/// Outgoing link flavor, used for link-type filtering and priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Nav,
    Article,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Nav => "nav",
            LinkKind::Article => "article",
        }
    }
}

/// Category a failure is filed under in the `errors` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Http,
    Network,
    Save,
    Parse,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Http => "http",
            ErrorKind::Network => "network",
            ErrorKind::Save => "save",
            ErrorKind::Parse => "parse",
            ErrorKind::Other => "other",
        }
    }
}

/// Terminal and non-terminal states of a crawl job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Paused,
    Stopping,
    Done,
    Stopped,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Stopping => "stopping",
            JobStatus::Done => "done",
            JobStatus::Stopped => "stopped",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Stopped | JobStatus::Failed | JobStatus::Aborted
        )
    }
}

/// Conditional request headers taken from a previously stored article.
#[derive(Debug, Clone, Default)]
pub struct ConditionalHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Per-attempt fetch options. The timeout is a hard ceiling; fetchers do
/// not retry internally.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
    pub conditional: Option<ConditionalHeaders>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
            conditional: None,
        }
    }
}

/// Failure attached to a `FetchResult` instead of unwinding out of the
/// fetcher. The orchestrator owns retries.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub code: Option<i64>,
    pub message: String,
}

/// Everything one fetch attempt produced, success or not.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub http_status: Option<u16>,
    pub headers: HashMap<String, String>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub content_encoding: Option<String>,
    pub bytes: Vec<u8>,
    pub redirect_chain: Vec<String>,
    pub ttfb_ms: Option<i64>,
    pub download_ms: Option<i64>,
    pub total_ms: Option<i64>,
    pub request_started_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub cached: bool,
    pub error: Option<FetchFailure>,
    pub method: &'static str,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.http_status.map(|s| s < 400).unwrap_or(false)
    }
}

/// HTTP transport. One implementation wraps a standard HTTP client;
/// another may drive a real browser for bot-hostile sites (same contract,
/// `method = "browser"`).
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> FetchResult;

    fn method(&self) -> &'static str {
        "http"
    }
}

/// A link discovered by the analyzer, before normalization/enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub url: String,
    pub anchor: Option<String>,
    pub rel: Option<String>,
    pub kind: LinkKind,
}

/// What the analyzer derives from one response body.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub classification: Classification,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub section: Option<String>,
    pub text: Option<String>,
    pub word_count: Option<i64>,
    pub language: Option<String>,
    pub article_xpath: Option<String>,
    pub links: Vec<DiscoveredLink>,
    pub analysis: serde_json::Value,
}

/// Classification + extraction. Pure over its inputs modulo process-wide
/// caches; bounded local parsing only, no I/O.
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(
        &self,
        url: &Url,
        bytes: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<AnalysisResult, ParseError>;
}

/// Origin of a queue item; drives the base priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueItemKind {
    Seed,
    HubSeed,
    Article,
    Nav,
    Other,
}

impl QueueItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemKind::Seed => "seed",
            QueueItemKind::HubSeed => "hub-seed",
            QueueItemKind::Article => "article",
            QueueItemKind::Nav => "nav",
            QueueItemKind::Other => "other",
        }
    }
}

/// One unit of pending work. `url` is canonical; `priority` is fixed at
/// enqueue time.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub url: String,
    pub host: String,
    pub depth: u32,
    pub kind: QueueItemKind,
    pub priority: f64,
    pub discovery_method: Option<String>,
    pub referrer: Option<String>,
    pub attempt: u32,
    pub allow_revisit: bool,
}
