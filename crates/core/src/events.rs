use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::types::{Classification, ErrorKind};

/// How a finished job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Stopped,
    Failed,
    Aborted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Stopped => "stopped",
            Outcome::Failed => "failed",
            Outcome::Aborted => "aborted",
        }
    }
}

/// Cumulative counters carried by progress and end events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub visited: u64,
    pub downloaded: u64,
    pub saved: u64,
    pub errors: u64,
    pub found: u64,
    pub queue_size: u64,
}

/// Everything observable that happens during a crawl flows through the bus
/// as one of these. Known shapes are enumerated; anything else rides in
/// `Other`.
#[derive(Debug, Clone)]
pub enum EventPayload {
    CrawlStart {
        seeds: Vec<String>,
        concurrency: usize,
    },
    CrawlEnd {
        outcome: Outcome,
        counters: ProgressCounters,
    },
    CrawlPause,
    CrawlResume,
    Progress(ProgressCounters),
    UrlDequeued {
        url: String,
        host: String,
        depth: u32,
    },
    UrlFetched {
        url: String,
        http_status: Option<u16>,
        content_type: Option<String>,
        total_ms: Option<i64>,
        bytes_downloaded: i64,
        cached: bool,
    },
    UrlSaved {
        url: String,
        classification: Classification,
        word_count: Option<i64>,
    },
    UrlEnqueued {
        url: String,
        depth: u32,
        priority: f64,
        discovery_method: Option<String>,
    },
    LinksDiscovered {
        url: String,
        count: usize,
        nav: usize,
        article: usize,
    },
    UrlError {
        url: String,
        kind: ErrorKind,
        code: Option<i64>,
        message: String,
    },
    RateLimit {
        host: String,
        retry_after_ms: u64,
    },
    ParseFailed {
        url: String,
        message: String,
    },
    GoalReached {
        goal: String,
    },
    Other {
        event_type: String,
        data: Value,
    },
}

impl EventPayload {
    /// Wire name of the event, as stored in `task_events.event_type`.
    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::CrawlStart { .. } => "crawl:start",
            EventPayload::CrawlEnd { .. } => "crawl:end",
            EventPayload::CrawlPause => "crawl:pause",
            EventPayload::CrawlResume => "crawl:resume",
            EventPayload::Progress(_) => "crawl:progress",
            EventPayload::UrlDequeued { .. } => "url:dequeued",
            EventPayload::UrlFetched { .. } => "url:fetched",
            EventPayload::UrlSaved { .. } => "url:saved",
            EventPayload::UrlEnqueued { .. } => "url:enqueued",
            EventPayload::LinksDiscovered { .. } => "links:discovered",
            EventPayload::UrlError { .. } => "url:error",
            EventPayload::RateLimit { .. } => "rate:limit",
            EventPayload::ParseFailed { .. } => "parse:error",
            EventPayload::GoalReached { .. } => "goal:reached",
            EventPayload::Other { event_type, .. } => event_type,
        }
    }

    /// Full event data, JSON-serialized for the durable `payload` column.
    pub fn data(&self) -> Value {
        match self {
            EventPayload::CrawlStart { seeds, concurrency } => json!({
                "seeds": seeds,
                "concurrency": concurrency,
            }),
            EventPayload::CrawlEnd { outcome, counters } => json!({
                "outcome": outcome.as_str(),
                "visited": counters.visited,
                "downloaded": counters.downloaded,
                "saved": counters.saved,
                "errors": counters.errors,
                "found": counters.found,
            }),
            EventPayload::CrawlPause | EventPayload::CrawlResume => json!({}),
            EventPayload::Progress(c) => json!({
                "visited": c.visited,
                "downloaded": c.downloaded,
                "saved": c.saved,
                "errors": c.errors,
                "found": c.found,
                "queued": c.queue_size,
            }),
            EventPayload::UrlDequeued { url, host, depth } => json!({
                "url": url,
                "domain": host,
                "depth": depth,
            }),
            EventPayload::UrlFetched {
                url,
                http_status,
                content_type,
                total_ms,
                bytes_downloaded,
                cached,
            } => json!({
                "url": url,
                "httpStatus": http_status,
                "contentType": content_type,
                "durationMs": total_ms,
                "bytes": bytes_downloaded,
                "cached": cached,
            }),
            EventPayload::UrlSaved {
                url,
                classification,
                word_count,
            } => json!({
                "url": url,
                "classification": classification.as_str(),
                "wordCount": word_count,
            }),
            EventPayload::UrlEnqueued {
                url,
                depth,
                priority,
                discovery_method,
            } => json!({
                "url": url,
                "depth": depth,
                "priority": priority,
                "discoveryMethod": discovery_method,
            }),
            EventPayload::LinksDiscovered {
                url,
                count,
                nav,
                article,
            } => json!({
                "url": url,
                "count": count,
                "nav": nav,
                "article": article,
            }),
            EventPayload::UrlError {
                url,
                kind,
                code,
                message,
            } => json!({
                "url": url,
                "kind": kind.as_str(),
                "status": code,
                "message": message,
            }),
            EventPayload::RateLimit {
                host,
                retry_after_ms,
            } => json!({
                "domain": host,
                "retryAfterMs": retry_after_ms,
            }),
            EventPayload::ParseFailed { url, message } => json!({
                "url": url,
                "message": message,
            }),
            EventPayload::GoalReached { goal } => json!({ "goal": goal }),
            EventPayload::Other { data, .. } => data.clone(),
        }
    }

    /// URL or pattern the event is about, for the `target` column.
    pub fn target(&self) -> Option<&str> {
        match self {
            EventPayload::UrlDequeued { url, .. }
            | EventPayload::UrlFetched { url, .. }
            | EventPayload::UrlSaved { url, .. }
            | EventPayload::UrlEnqueued { url, .. }
            | EventPayload::LinksDiscovered { url, .. }
            | EventPayload::UrlError { url, .. }
            | EventPayload::ParseFailed { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// One published event: a job, a timestamp, and a payload.
#[derive(Debug, Clone)]
pub struct CrawlEvent {
    pub job_id: String,
    pub ts: DateTime<Utc>,
    pub payload: EventPayload,
}

impl CrawlEvent {
    pub fn now(job_id: &str, payload: EventPayload) -> Self {
        Self {
            job_id: job_id.to_string(),
            ts: Utc::now(),
            payload,
        }
    }
}
