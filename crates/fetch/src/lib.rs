use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use url::Url;

use newsreel_core::config::FetchConfig;
use newsreel_core::{CrawlError, ErrorKind, FetchFailure, FetchOptions, FetchResult, Fetcher};

/// Default transport: a plain HTTP client with manual redirect following
/// so the chain is observable. The per-attempt timeout is a hard ceiling
/// over the whole exchange; retries belong to the orchestrator.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_redirects: usize,
    max_body_size: usize,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_millis(cfg.timeout_ms.min(30_000)))
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self {
            client,
            max_redirects: cfg.max_redirects,
            max_body_size: cfg.max_body_size_mb * 1024 * 1024,
        })
    }
}

pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Retry-After header: delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&Utc) - Utc::now();
    Some(Duration::from_secs(delta.num_seconds().max(0) as u64))
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in headers {
        if let Ok(val) = v.to_str() {
            out.insert(k.as_str().to_string(), val.to_string());
        }
    }
    out
}

fn failed(url: &Url, started: chrono::DateTime<chrono::Utc>, t0: Instant, failure: FetchFailure) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        final_url: url.to_string(),
        http_status: None,
        headers: HashMap::new(),
        content_type: None,
        content_length: None,
        content_encoding: None,
        bytes: Vec::new(),
        redirect_chain: Vec::new(),
        ttfb_ms: None,
        download_ms: None,
        total_ms: Some(t0.elapsed().as_millis() as i64),
        request_started_at: started,
        fetched_at: Utc::now(),
        cached: false,
        error: Some(failure),
        method: "http",
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> FetchResult {
        let started = Utc::now();
        let t0 = Instant::now();
        let deadline = tokio::time::Instant::now() + options.timeout;

        let mut current = url.clone();
        let mut redirect_chain: Vec<String> = Vec::new();

        let response = loop {
            let mut request = self.client.get(current.as_str());
            for (name, value) in &options.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(conditional) = &options.conditional {
                if let Some(etag) = &conditional.etag {
                    request = request.header("If-None-Match", etag.as_str());
                }
                if let Some(lm) = &conditional.last_modified {
                    request = request.header("If-Modified-Since", lm.as_str());
                }
            }

            let sent = tokio::time::timeout_at(deadline, request.send()).await;
            let response = match sent {
                Err(_) => {
                    warn!(url = %current, "fetch timed out");
                    return failed(
                        url,
                        started,
                        t0,
                        FetchFailure {
                            kind: ErrorKind::Network,
                            code: None,
                            message: format!("timeout after {}ms", options.timeout.as_millis()),
                        },
                    );
                }
                Ok(Err(e)) => {
                    debug!(url = %current, "fetch failed: {e}");
                    return failed(
                        url,
                        started,
                        t0,
                        FetchFailure {
                            kind: ErrorKind::Network,
                            code: None,
                            message: e.to_string(),
                        },
                    );
                }
                Ok(Ok(response)) => response,
            };

            let status = response.status().as_u16();
            if is_redirect(status) {
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| current.join(loc).ok());
                match location {
                    Some(next) if redirect_chain.len() < self.max_redirects => {
                        redirect_chain.push(current.to_string());
                        current = next;
                        continue;
                    }
                    Some(_) => {
                        return failed(
                            url,
                            started,
                            t0,
                            FetchFailure {
                                kind: ErrorKind::Http,
                                code: Some(status as i64),
                                message: format!("redirect chain longer than {}", self.max_redirects),
                            },
                        );
                    }
                    None => break response,
                }
            }
            break response;
        };

        let ttfb_ms = t0.elapsed().as_millis() as i64;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let final_url = response.url().to_string();
        let content_type = headers.get("content-type").cloned();
        let content_encoding = headers.get("content-encoding").cloned();
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<i64>().ok());

        let body_started = Instant::now();
        let body = match tokio::time::timeout_at(deadline, response.bytes()).await {
            Err(_) => {
                return failed(
                    url,
                    started,
                    t0,
                    FetchFailure {
                        kind: ErrorKind::Network,
                        code: None,
                        message: format!("body read timeout after {}ms", options.timeout.as_millis()),
                    },
                );
            }
            Ok(Err(e)) => {
                return failed(
                    url,
                    started,
                    t0,
                    FetchFailure {
                        kind: ErrorKind::Network,
                        code: None,
                        message: e.to_string(),
                    },
                );
            }
            Ok(Ok(body)) => body,
        };

        if body.len() > self.max_body_size {
            return failed(
                url,
                started,
                t0,
                FetchFailure {
                    kind: ErrorKind::Other,
                    code: None,
                    message: format!("body too large: {} bytes (max {})", body.len(), self.max_body_size),
                },
            );
        }

        let download_ms = body_started.elapsed().as_millis() as i64;
        let total_ms = t0.elapsed().as_millis() as i64;

        FetchResult {
            url: url.to_string(),
            final_url,
            http_status: Some(status),
            headers,
            content_type,
            content_length,
            content_encoding,
            bytes: body.to_vec(),
            redirect_chain,
            ttfb_ms: Some(ttfb_ms),
            download_ms: Some(download_ms),
            total_ms: Some(total_ms),
            request_started_at: started,
            fetched_at: Utc::now(),
            cached: status == 304,
            error: None,
            method: "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_statuses() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status));
        }
        for status in [200, 204, 304, 404, 500] {
            assert!(!is_redirect(status));
        }
    }

    #[test]
    fn test_retry_after_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 120 "), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_retry_after_http_date_in_past_is_zero() {
        let past = "Wed, 21 Oct 2015 07:28:00 GMT";
        assert_eq!(parse_retry_after(past), Some(Duration::from_secs(0)));
    }

    #[test]
    fn test_fetcher_builds_from_defaults() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        assert_eq!(fetcher.max_redirects, 10);
        assert_eq!(fetcher.max_body_size, 10 * 1024 * 1024);
    }
}
