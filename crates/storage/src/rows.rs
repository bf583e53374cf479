//! Row shapes passed across the store boundary. Timestamps are RFC 3339
//! UTC strings, matching the column encoding.

#[derive(Debug, Clone, Default)]
pub struct FetchRecord {
    pub url: String,
    pub host: Option<String>,
    pub request_started_at: Option<String>,
    pub fetched_at: Option<String>,
    pub http_status: Option<i64>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub content_encoding: Option<String>,
    pub bytes_downloaded: Option<i64>,
    pub transfer_kbps: Option<f64>,
    pub ttfb_ms: Option<i64>,
    pub download_ms: Option<i64>,
    pub total_ms: Option<i64>,
    pub saved_to_db: Option<bool>,
    pub saved_to_file: Option<bool>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub classification: Option<String>,
    pub nav_links_count: Option<i64>,
    pub article_links_count: Option<i64>,
    pub word_count: Option<i64>,
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleRecord {
    pub url: String,
    pub host: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub section: Option<String>,
    pub html: Option<String>,
    pub crawled_at: Option<String>,
    pub canonical_url: Option<String>,
    pub referrer_url: Option<String>,
    pub discovered_at: Option<String>,
    pub crawl_depth: Option<i64>,
    pub fetched_at: Option<String>,
    pub http_status: Option<i64>,
    pub content_length: Option<i64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub redirect_chain: Option<String>,
    pub ttfb_ms: Option<i64>,
    pub download_ms: Option<i64>,
    pub total_ms: Option<i64>,
    pub bytes_downloaded: Option<i64>,
    pub transfer_kbps: Option<f64>,
    pub html_sha256: Option<String>,
    pub text: Option<String>,
    pub word_count: Option<i64>,
    pub language: Option<String>,
    pub article_xpath: Option<String>,
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LinkRecord {
    pub src_url: String,
    pub dst_url: String,
    pub anchor: Option<String>,
    pub rel: Option<String>,
    pub link_type: Option<String>,
    pub depth: Option<i64>,
    pub on_domain: Option<bool>,
    pub discovered_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorRecord {
    pub url: Option<String>,
    pub host: Option<String>,
    pub kind: String,
    pub code: Option<i64>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub at: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueueEventRecord {
    pub job_id: String,
    pub ts: String,
    pub action: String,
    pub url: Option<String>,
    pub depth: Option<i64>,
    pub host: Option<String>,
    pub reason: Option<String>,
    pub queue_size: Option<i64>,
    pub alias: Option<String>,
    pub queue_origin: Option<String>,
    pub queue_role: Option<String>,
    pub queue_depth_bucket: Option<String>,
}

/// Shared shape for problems, milestones, and planner stage events.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticRecord {
    pub job_id: String,
    pub kind: String,
    pub scope: Option<String>,
    pub target: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub ts: String,
}

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub url: Option<String>,
    pub args: Option<String>,
    pub pid: Option<i64>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: Option<String>,
    pub crawled_at: Option<String>,
    pub canonical_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrawlTaskRow {
    pub id: i64,
    pub job_id: String,
    pub kind: String,
    pub payload: Option<String>,
    pub status: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
