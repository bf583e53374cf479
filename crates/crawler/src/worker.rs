use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use url::Url;

use newsreel_core::config::{CrawlConfig, RetryConfig};
use newsreel_core::events::{CrawlEvent, EventPayload, ProgressCounters};
use newsreel_core::urlnorm;
use newsreel_core::{
    Analyzer, AnalysisResult, Classification, ConditionalHeaders, ErrorKind, FetchOptions,
    FetchResult, Fetcher, LinkKind, QueueItem, QueueItemKind,
};
use newsreel_fetch::parse_retry_after;
use newsreel_frontier::{Frontier, HostLimiter, Pull};
use newsreel_storage::{
    ArticleRecord, DiagnosticRecord, ErrorRecord, FetchRecord, LinkRecord, QueueEventRecord, Store,
};
use newsreel_telemetry::{EventWriter, TelemetryBus};

use crate::control::DesiredState;

/// Floor for idle waits so pause/stop flags are re-checked promptly.
const IDLE_WAIT: Duration = Duration::from_millis(100);

#[derive(Default)]
pub(crate) struct Counters {
    pub visited: AtomicU64,
    pub downloaded: AtomicU64,
    pub saved: AtomicU64,
    pub errors: AtomicU64,
    pub found: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self, queue_size: u64) -> ProgressCounters {
        ProgressCounters {
            visited: self.visited.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            queue_size,
        }
    }
}

/// Everything the worker pool shares for one job.
pub(crate) struct Shared {
    pub cfg: CrawlConfig,
    pub job_id: String,
    pub store: Store,
    pub bus: TelemetryBus,
    pub writer: Arc<EventWriter>,
    pub frontier: Frontier,
    pub limiter: HostLimiter,
    pub fetcher: Arc<dyn Fetcher>,
    pub analyzer: Arc<dyn Analyzer>,
    pub desired_tx: Arc<watch::Sender<DesiredState>>,
    pub counters: Counters,
    pub in_flight: AtomicUsize,
    pub notify: Notify,
    pub complete: AtomicBool,
    pub goal_reached: AtomicBool,
    pub domain_pages: DashMap<String, u64>,
    pub last_progress: Mutex<Instant>,
}

impl Shared {
    pub(crate) async fn emit(&self, payload: EventPayload) {
        let event = CrawlEvent::now(&self.job_id, payload);
        self.bus.publish(event.clone());
        self.writer.write_event(&event).await;
    }

    pub(crate) async fn queue_event(
        &self,
        action: &str,
        url: Option<&str>,
        depth: Option<u32>,
        host: Option<&str>,
        reason: Option<&str>,
        origin: Option<&str>,
    ) {
        self.store
            .insert_queue_event(&QueueEventRecord {
                job_id: self.job_id.clone(),
                ts: chrono::Utc::now().to_rfc3339(),
                action: action.to_string(),
                url: url.map(str::to_string),
                depth: depth.map(|d| d as i64),
                host: host.map(str::to_string),
                reason: reason.map(str::to_string),
                queue_size: Some(self.frontier.size() as i64),
                queue_origin: origin.map(str::to_string),
                ..Default::default()
            })
            .await;
    }

    async fn record_error(
        &self,
        url: Option<&str>,
        host: Option<&str>,
        kind: ErrorKind,
        code: Option<i64>,
        message: &str,
    ) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        let res = self
            .store
            .insert_error(&ErrorRecord {
                url: url.map(str::to_string),
                host: host.map(str::to_string),
                kind: kind.as_str().to_string(),
                code,
                message: Some(message.to_string()),
                details: None,
                at: chrono::Utc::now().to_rfc3339(),
            })
            .await;
        if let Err(e) = res {
            warn!(kind = kind.as_str(), "error row insert failed: {e}");
        }
        if let Some(url) = url {
            self.emit(EventPayload::UrlError {
                url: url.to_string(),
                kind,
                code,
                message: message.to_string(),
            })
            .await;
        }
    }

    async fn maybe_progress(&self, force: bool) {
        let interval = Duration::from_millis(self.cfg.progress_interval_ms);
        let due = {
            let mut last = self.last_progress.lock().unwrap_or_else(|e| e.into_inner());
            if force || last.elapsed() >= interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            let snapshot = self.counters.snapshot(self.frontier.size() as u64);
            self.emit(EventPayload::Progress(snapshot)).await;
        }
    }

    fn goal_hit(&self) -> Option<&'static str> {
        if let Some(max) = self.cfg.max_downloads {
            if self.counters.downloaded.load(Ordering::Relaxed) >= max {
                return Some("max_downloads");
            }
        }
        None
    }
}

fn retry_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let mult = cfg.backoff_multiplier.max(1.0);
    let delay = cfg.initial_delay_ms as f64 * mult.powi(attempt.saturating_sub(1) as i32);
    Duration::from_millis((delay as u64).min(cfg.max_delay_ms))
}

fn is_texty(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.contains("text/html") || ct.starts_with("text/") || ct.contains("xml"))
        .unwrap_or(true)
}

async fn wait_for_abort(rx: &mut watch::Receiver<DesiredState>) {
    loop {
        if *rx.borrow() == DesiredState::Aborting {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// One worker of the pool: pull, process, repeat, honoring pause/stop at
/// every step boundary.
pub(crate) async fn worker(shared: Arc<Shared>, worker_id: usize) {
    let mut desired = shared.desired_tx.subscribe();
    debug!(worker_id, "worker started");

    loop {
        let state = *desired.borrow();
        match state {
            DesiredState::Stopping | DesiredState::Aborting => break,
            DesiredState::Paused => {
                if desired.changed().await.is_err() {
                    break;
                }
                continue;
            }
            DesiredState::Running => {}
        }
        if shared.complete.load(Ordering::SeqCst) {
            break;
        }

        match shared.frontier.pull(Instant::now(), &shared.limiter) {
            Pull::Item(item) => {
                shared.in_flight.fetch_add(1, Ordering::SeqCst);
                let host = item.host.clone();
                process_item(&shared, &mut desired, worker_id, item).await;
                shared.limiter.on_complete(&host);
                shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                shared.maybe_progress(false).await;
                shared.notify.notify_waiters();
            }
            Pull::Wait { until } => {
                let wait = until
                    .map(|u| u.saturating_duration_since(Instant::now()))
                    .filter(|d| !d.is_zero())
                    .unwrap_or(IDLE_WAIT);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shared.notify.notified() => {}
                    _ = desired.changed() => {}
                }
            }
            Pull::Empty => {
                if shared.in_flight.load(Ordering::SeqCst) == 0 {
                    // Gated URLs stay queued, so an empty queue cannot be
                    // readmitted by a backoff expiry; note stragglers and
                    // finish.
                    if let Some(until) = shared.limiter.pending_backoff_until(Instant::now()) {
                        debug!(
                            worker_id,
                            backoff_remaining_ms =
                                until.saturating_duration_since(Instant::now()).as_millis() as u64,
                            "queue drained while a host backoff is still pending"
                        );
                    }
                    shared.complete.store(true, Ordering::SeqCst);
                    shared.notify.notify_waiters();
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_WAIT) => {}
                    _ = shared.notify.notified() => {}
                    _ = desired.changed() => {}
                }
            }
        }
    }
    debug!(worker_id, "worker exited");
}

async fn process_item(
    shared: &Arc<Shared>,
    desired: &mut watch::Receiver<DesiredState>,
    worker_id: usize,
    item: QueueItem,
) {
    let host = item.host.clone();
    shared
        .emit(EventPayload::UrlDequeued {
            url: item.url.clone(),
            host: host.clone(),
            depth: item.depth,
        })
        .await;
    shared
        .queue_event("dequeued", Some(&item.url), Some(item.depth), Some(&host), None, None)
        .await;

    // Per-domain page budget.
    if let Some(cap) = shared.cfg.max_pages_per_domain {
        let count = shared.domain_pages.get(&host).map(|c| *c).unwrap_or(0);
        if count >= cap {
            shared
                .queue_event(
                    "skipped",
                    Some(&item.url),
                    Some(item.depth),
                    Some(&host),
                    Some("domain-cap"),
                    None,
                )
                .await;
            return;
        }
    }

    let parsed_url = match Url::parse(&item.url) {
        Ok(u) => u,
        Err(e) => {
            shared
                .record_error(Some(&item.url), Some(&host), ErrorKind::Other, None, &e.to_string())
                .await;
            return;
        }
    };

    let conditional = if shared.cfg.prefer_cache {
        match shared.store.get_article_headers(&item.url).await {
            Ok(Some(headers)) if headers.etag.is_some() || headers.last_modified.is_some() => {
                Some(ConditionalHeaders {
                    etag: headers.etag,
                    last_modified: headers.last_modified,
                })
            }
            _ => None,
        }
    } else {
        None
    };
    let options = FetchOptions {
        timeout: Duration::from_millis(shared.cfg.fetch.timeout_ms),
        headers: Vec::new(),
        conditional,
    };

    info!(worker_id, url = %item.url, depth = item.depth, attempt = item.attempt, "fetching");

    let max_attempts = shared.cfg.retry.max_attempts.max(1);
    let mut attempt = item.attempt;
    let result: FetchResult = loop {
        attempt += 1;
        let result = tokio::select! {
            result = shared.fetcher.fetch(&parsed_url, &options) => result,
            _ = wait_for_abort(desired) => {
                shared
                    .queue_event("expired", Some(&item.url), Some(item.depth), Some(&host), Some("abort"), None)
                    .await;
                return;
            }
        };

        if let Some(failure) = &result.error {
            if failure.kind == ErrorKind::Network {
                shared.limiter.on_network_error(&host, Instant::now());
            }
            if failure.kind == ErrorKind::Network && attempt < max_attempts {
                warn!(worker_id, url = %item.url, attempt, "fetch failed, will retry: {}", failure.message);
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay(&shared.cfg.retry, attempt)) => {}
                    _ = wait_for_abort(desired) => return,
                }
                if *desired.borrow() != DesiredState::Running {
                    // Stop arrived while backing off; shelve the URL.
                    return;
                }
                continue;
            }
            // Exhausted or non-retryable: keep the attempt on record.
            let _ = shared.store.insert_fetch(&fetch_record(&item, &host, &result, None)).await;
            shared
                .record_error(
                    Some(&item.url),
                    Some(&host),
                    failure.kind,
                    failure.code,
                    &failure.message,
                )
                .await;
            shared.counters.visited.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let status = result.http_status.unwrap_or(0);
        if status == 429 {
            let retry_after = result
                .headers
                .get("retry-after")
                .and_then(|v| parse_retry_after(v))
                .unwrap_or(Duration::from_secs(30));
            shared.limiter.on_rate_limited(&host, retry_after, Instant::now());
            shared
                .emit(EventPayload::RateLimit {
                    host: host.clone(),
                    retry_after_ms: retry_after.as_millis() as u64,
                })
                .await;
            shared
                .store
                .insert_problem(&DiagnosticRecord {
                    job_id: shared.job_id.clone(),
                    kind: "rate:limit".to_string(),
                    scope: Some(format!("domain:{host}")),
                    target: Some(item.url.clone()),
                    message: Some(format!("429 with retry-after {}s", retry_after.as_secs())),
                    details: None,
                    ts: chrono::Utc::now().to_rfc3339(),
                })
                .await;
            let _ = shared.store.insert_fetch(&fetch_record(&item, &host, &result, None)).await;

            if attempt < max_attempts {
                let mut retry = item.clone();
                retry.attempt = attempt;
                retry.allow_revisit = true;
                shared.frontier.enqueue(retry);
                shared
                    .queue_event(
                        "requeued",
                        Some(&item.url),
                        Some(item.depth),
                        Some(&host),
                        Some("rate-limit"),
                        None,
                    )
                    .await;
                shared.notify.notify_waiters();
            } else {
                shared
                    .record_error(Some(&item.url), Some(&host), ErrorKind::Http, Some(429), "rate limited")
                    .await;
                shared.counters.visited.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        if (500..600).contains(&status) && attempt < max_attempts {
            shared.limiter.on_network_error(&host, Instant::now());
            warn!(worker_id, url = %item.url, status, attempt, "server error, will retry");
            tokio::select! {
                _ = tokio::time::sleep(retry_delay(&shared.cfg.retry, attempt)) => {}
                _ = wait_for_abort(desired) => return,
            }
            if *desired.borrow() != DesiredState::Running {
                return;
            }
            continue;
        }

        break result;
    };

    let status = result.http_status.unwrap_or(0);
    let success = (200..300).contains(&status);
    let cached = result.cached;

    // Classify and extract before persisting so the fetch row carries the
    // outcome.
    let mut analysis: Option<AnalysisResult> = None;
    if success && !cached && is_texty(result.content_type.as_deref()) {
        match shared
            .analyzer
            .analyze(&parsed_url, &result.bytes, &result.headers)
        {
            Ok(a) => analysis = Some(a),
            Err(parse_error) => {
                shared
                    .emit(EventPayload::ParseFailed {
                        url: item.url.clone(),
                        message: parse_error.0.clone(),
                    })
                    .await;
                shared
                    .store
                    .insert_problem(&DiagnosticRecord {
                        job_id: shared.job_id.clone(),
                        kind: "parse:error".to_string(),
                        scope: Some(format!("domain:{host}")),
                        target: Some(item.url.clone()),
                        message: Some(parse_error.0.clone()),
                        details: None,
                        ts: chrono::Utc::now().to_rfc3339(),
                    })
                    .await;
                shared
                    .record_error(
                        Some(&item.url),
                        Some(&host),
                        ErrorKind::Parse,
                        None,
                        &parse_error.0,
                    )
                    .await;
            }
        }
    }
    let classification = if success && !cached {
        Some(analysis.as_ref().map(|a| a.classification).unwrap_or(Classification::Other))
    } else {
        None
    };

    let mut fetch_row = fetch_record(&item, &host, &result, classification);
    if let Some(a) = &analysis {
        let (nav, article) = link_counts(a);
        fetch_row.nav_links_count = Some(nav as i64);
        fetch_row.article_links_count = Some(article as i64);
        fetch_row.word_count = a.word_count;
        fetch_row.analysis = Some(a.analysis.to_string());
        fetch_row.saved_to_db = Some(a.classification == Classification::Article);
    }
    if let Err(e) = shared.store.insert_fetch(&fetch_row).await {
        shared
            .record_error(Some(&item.url), Some(&host), ErrorKind::Save, None, &e.to_string())
            .await;
    }

    if success || cached {
        shared.limiter.on_success(&host, Instant::now());
        shared
            .emit(EventPayload::UrlFetched {
                url: item.url.clone(),
                http_status: result.http_status,
                content_type: result.content_type.clone(),
                total_ms: result.total_ms,
                bytes_downloaded: result.bytes.len() as i64,
                cached,
            })
            .await;
        if success {
            shared.counters.downloaded.fetch_add(1, Ordering::Relaxed);
        }
        *shared.domain_pages.entry(host.clone()).or_insert(0) += 1;
    } else {
        shared
            .record_error(
                Some(&item.url),
                Some(&host),
                ErrorKind::Http,
                Some(status as i64),
                &format!("http status {status}"),
            )
            .await;
    }

    if let Some(a) = analysis {
        persist_analysis(shared, &item, &host, &result, &a).await;
        enqueue_links(shared, &item, &host, &a).await;
    }

    shared.counters.visited.fetch_add(1, Ordering::Relaxed);

    if let Some(goal) = shared.goal_hit() {
        shared.goal_reached.store(true, Ordering::SeqCst);
        shared
            .emit(EventPayload::GoalReached {
                goal: goal.to_string(),
            })
            .await;
        shared.desired_tx.send_if_modified(|state| {
            if *state == DesiredState::Running || *state == DesiredState::Paused {
                *state = DesiredState::Stopping;
                true
            } else {
                false
            }
        });
    }
}

fn link_counts(a: &AnalysisResult) -> (usize, usize) {
    a.links.iter().fold((0, 0), |(nav, article), link| match link.kind {
        LinkKind::Nav => (nav + 1, article),
        LinkKind::Article => (nav, article + 1),
    })
}

fn fetch_record(
    item: &QueueItem,
    host: &str,
    result: &FetchResult,
    classification: Option<Classification>,
) -> FetchRecord {
    let transfer_kbps = match (result.download_ms, result.bytes.len()) {
        (Some(ms), len) if ms > 0 && len > 0 => {
            Some((len as f64 / 1024.0) / (ms as f64 / 1000.0))
        }
        _ => None,
    };
    FetchRecord {
        url: item.url.clone(),
        host: Some(host.to_string()),
        request_started_at: Some(result.request_started_at.to_rfc3339()),
        fetched_at: Some(result.fetched_at.to_rfc3339()),
        http_status: result.http_status.map(|s| s as i64),
        content_type: result.content_type.clone(),
        content_length: result.content_length,
        content_encoding: result.content_encoding.clone(),
        bytes_downloaded: Some(result.bytes.len() as i64),
        transfer_kbps,
        ttfb_ms: result.ttfb_ms,
        download_ms: result.download_ms,
        total_ms: result.total_ms,
        classification: classification.map(|c| c.as_str().to_string()),
        ..Default::default()
    }
}

async fn persist_analysis(
    shared: &Arc<Shared>,
    item: &QueueItem,
    host: &str,
    result: &FetchResult,
    a: &AnalysisResult,
) {
    let now = chrono::Utc::now().to_rfc3339();

    if a.classification == Classification::Article {
        let html = String::from_utf8_lossy(&result.bytes).to_string();
        let record = ArticleRecord {
            url: item.url.clone(),
            host: Some(host.to_string()),
            title: a.title.clone(),
            date: a.date.clone(),
            section: a.section.clone(),
            html_sha256: Some(newsreel_parser::sha256_hex(&result.bytes)),
            html: Some(html),
            crawled_at: Some(now.clone()),
            canonical_url: a.canonical_url.clone(),
            referrer_url: item.referrer.clone(),
            discovered_at: Some(now.clone()),
            crawl_depth: Some(item.depth as i64),
            fetched_at: Some(result.fetched_at.to_rfc3339()),
            http_status: result.http_status.map(|s| s as i64),
            content_length: result.content_length,
            etag: result.headers.get("etag").cloned(),
            last_modified: result.headers.get("last-modified").cloned(),
            redirect_chain: if result.redirect_chain.is_empty() {
                None
            } else {
                serde_json::to_string(&result.redirect_chain).ok()
            },
            ttfb_ms: result.ttfb_ms,
            download_ms: result.download_ms,
            total_ms: result.total_ms,
            bytes_downloaded: Some(result.bytes.len() as i64),
            transfer_kbps: None,
            text: a.text.clone(),
            word_count: a.word_count,
            language: a.language.clone(),
            article_xpath: a.article_xpath.clone(),
            analysis: Some(a.analysis.to_string()),
        };
        match shared.store.upsert_article(&record).await {
            Ok(()) => {
                shared.counters.saved.fetch_add(1, Ordering::Relaxed);
                shared
                    .emit(EventPayload::UrlSaved {
                        url: item.url.clone(),
                        classification: a.classification,
                        word_count: a.word_count,
                    })
                    .await;
            }
            Err(e) => {
                shared
                    .record_error(Some(&item.url), Some(host), ErrorKind::Save, None, &e.to_string())
                    .await;
                shared
                    .store
                    .insert_problem(&DiagnosticRecord {
                        job_id: shared.job_id.clone(),
                        kind: "save:inconsistent".to_string(),
                        scope: Some(format!("domain:{host}")),
                        target: Some(item.url.clone()),
                        message: Some("fetch stored but article upsert failed".to_string()),
                        details: Some(e.to_string()),
                        ts: now.clone(),
                    })
                    .await;
            }
        }

        if let Some(canonical) = &a.canonical_url {
            if canonical != &item.url {
                let canonical_host = urlnorm::host_of(canonical);
                let _ = shared
                    .store
                    .touch_url(canonical, canonical_host.as_deref(), None)
                    .await;
                let _ = shared
                    .store
                    .record_url_alias(
                        &item.url,
                        canonical,
                        Some("canonical"),
                        Some("rel-canonical"),
                        Some(true),
                        None,
                    )
                    .await;
            }
        }
    }

    // Link edges are recorded for every analyzed page; nav pages are where
    // most article URLs come from.
    let (nav, article) = link_counts(a);
    for link in &a.links {
        let dst_host = urlnorm::host_of(&link.url);
        let on_domain = dst_host
            .as_deref()
            .map(|dst| urlnorm::same_site(host, dst, shared.cfg.same_site_policy));
        let row = LinkRecord {
            src_url: item.url.clone(),
            dst_url: link.url.clone(),
            anchor: link.anchor.clone(),
            rel: link.rel.clone(),
            link_type: Some(link.kind.as_str().to_string()),
            depth: Some(item.depth as i64 + 1),
            on_domain,
            discovered_at: now.clone(),
        };
        if let Err(e) = shared.store.insert_link(&row).await {
            shared
                .record_error(Some(&item.url), Some(host), ErrorKind::Save, None, &e.to_string())
                .await;
        }
    }
    if !a.links.is_empty() {
        shared
            .emit(EventPayload::LinksDiscovered {
                url: item.url.clone(),
                count: a.links.len(),
                nav,
                article,
            })
            .await;
    }
}

async fn enqueue_links(shared: &Arc<Shared>, item: &QueueItem, host: &str, a: &AnalysisResult) {
    let next_depth = item.depth + 1;
    if next_depth > shared.cfg.max_depth {
        return;
    }

    let mut seen_this_page = std::collections::HashSet::new();
    let mut enqueued = 0usize;

    for link in &a.links {
        if !seen_this_page.insert(link.url.clone()) {
            continue;
        }
        let follow = match link.kind {
            LinkKind::Nav => shared.cfg.link_type_filter.follow_nav,
            LinkKind::Article => shared.cfg.link_type_filter.follow_article,
        };
        if !follow {
            shared
                .queue_event(
                    "skipped",
                    Some(&link.url),
                    Some(next_depth),
                    None,
                    Some("link-type"),
                    None,
                )
                .await;
            continue;
        }
        let Some(dst_host) = urlnorm::host_of(&link.url) else {
            continue;
        };
        if !urlnorm::same_site(host, &dst_host, shared.cfg.same_site_policy) {
            shared
                .queue_event(
                    "skipped",
                    Some(&link.url),
                    Some(next_depth),
                    Some(&dst_host),
                    Some("off-site"),
                    None,
                )
                .await;
            continue;
        }

        let (kind, method) = match link.kind {
            LinkKind::Article => (QueueItemKind::Article, "link:article"),
            LinkKind::Nav => (QueueItemKind::Nav, "link:nav"),
        };
        let priority = newsreel_frontier::priority::score(
            &shared.cfg.priority,
            kind,
            next_depth,
            Some(method),
            0.0,
            0.0,
        );
        let accepted = shared.frontier.enqueue(QueueItem {
            url: link.url.clone(),
            host: dst_host.clone(),
            depth: next_depth,
            kind,
            priority,
            discovery_method: Some(method.to_string()),
            referrer: Some(item.url.clone()),
            attempt: 0,
            allow_revisit: false,
        });
        if accepted {
            enqueued += 1;
            shared.counters.found.fetch_add(1, Ordering::Relaxed);
            shared
                .emit(EventPayload::UrlEnqueued {
                    url: link.url.clone(),
                    depth: next_depth,
                    priority,
                    discovery_method: Some(method.to_string()),
                })
                .await;
            shared
                .queue_event(
                    "enqueued",
                    Some(&link.url),
                    Some(next_depth),
                    Some(&dst_host),
                    None,
                    Some("link"),
                )
                .await;
        } else {
            shared
                .queue_event(
                    "skipped",
                    Some(&link.url),
                    Some(next_depth),
                    Some(&dst_host),
                    Some("seen"),
                    None,
                )
                .await;
        }
    }

    if enqueued > 0 {
        shared.notify.notify_waiters();
    }
}
