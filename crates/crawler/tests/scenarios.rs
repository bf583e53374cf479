use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use url::Url;

use newsreel_core::config::CrawlConfig;
use newsreel_core::events::{EventPayload, Outcome};
use newsreel_core::{
    AnalysisResult, Analyzer, ErrorKind, FetchFailure, FetchOptions, FetchResult, Fetcher,
    ParseError,
};
use newsreel_crawler::Orchestrator;
use newsreel_parser::HeuristicAnalyzer;
use newsreel_storage::Store;

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
    network_error: bool,
}

impl ScriptedResponse {
    fn ok(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type", "text/html; charset=utf-8".to_string())],
            body: body.to_string(),
            network_error: false,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            network_error: false,
        }
    }

    fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            status: 429,
            headers: vec![("retry-after", retry_after_secs.to_string())],
            body: String::new(),
            network_error: false,
        }
    }

    fn network_error() -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: String::new(),
            network_error: true,
        }
    }
}

/// Deterministic fetcher: per-URL response scripts, the last entry
/// repeating forever. Optionally sleeps per call so tests can interleave
/// control actions with an in-flight fetch.
struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    total_calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay,
            total_calls: AtomicUsize::new(0),
        }
    }

    fn script(self, url: &str, responses: Vec<ScriptedResponse>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, _options: &FetchOptions) -> FetchResult {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(url.as_str()) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let started = Utc::now();
        let base = FetchResult {
            url: url.to_string(),
            final_url: url.to_string(),
            http_status: None,
            headers: HashMap::new(),
            content_type: None,
            content_length: None,
            content_encoding: None,
            bytes: Vec::new(),
            redirect_chain: Vec::new(),
            ttfb_ms: Some(1),
            download_ms: Some(1),
            total_ms: Some(2),
            request_started_at: started,
            fetched_at: Utc::now(),
            cached: false,
            error: None,
            method: "http",
        };

        match scripted {
            None => FetchResult {
                error: Some(FetchFailure {
                    kind: ErrorKind::Network,
                    code: None,
                    message: "no script for url".to_string(),
                }),
                ..base
            },
            Some(r) if r.network_error => FetchResult {
                error: Some(FetchFailure {
                    kind: ErrorKind::Network,
                    code: None,
                    message: "connection refused".to_string(),
                }),
                ..base
            },
            Some(r) => {
                let headers: HashMap<String, String> = r
                    .headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect();
                FetchResult {
                    http_status: Some(r.status),
                    content_type: headers.get("content-type").cloned(),
                    content_length: Some(r.body.len() as i64),
                    bytes: r.body.into_bytes(),
                    cached: r.status == 304,
                    headers,
                    ..base
                }
            }
        }
    }
}

/// Analyzer that always raises, for the parse-error path.
struct FailingAnalyzer;

impl Analyzer for FailingAnalyzer {
    fn analyze(
        &self,
        _url: &Url,
        _bytes: &[u8],
        _headers: &HashMap<String, String>,
    ) -> Result<AnalysisResult, ParseError> {
        Err(ParseError("malformed markup".to_string()))
    }
}

fn test_config(job_id: &str) -> CrawlConfig {
    let mut cfg = CrawlConfig::default();
    cfg.job_id = Some(job_id.to_string());
    cfg.concurrency = 1;
    cfg.per_host_min_interval_ms = 0;
    cfg.progress_interval_ms = 0;
    cfg.retry.initial_delay_ms = 10;
    cfg.retry.max_delay_ms = 50;
    cfg.crawl_timeout_ms = Some(30_000);
    cfg
}

fn article_body(words: usize, links: &[&str]) -> String {
    let prose = "word ".repeat(words);
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{href}\">{href}</a>"))
        .collect();
    format!("<html lang=\"en\"><head><title>Story</title></head><body><article><p>{prose}</p></article>{anchors}</body></html>")
}

async fn event_types(store: &Store, job_id: &str) -> Vec<(i64, String)> {
    sqlx::query("SELECT seq, event_type FROM task_events WHERE task_id = ? ORDER BY seq")
        .bind(job_id)
        .fetch_all(store.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| (row.get("seq"), row.get("event_type")))
        .collect()
}

// Scenario: single-page crawl with article classification. One seed, two
// same-site outbound links, download budget of one page.
#[tokio::test]
async fn test_single_page_article_crawl() {
    let seed = "http://news.example.com/2026/08/01/top-story";
    let store = Store::open_memory().await.unwrap();
    let fetcher = ScriptedFetcher::new(Duration::ZERO).script(
        seed,
        vec![ScriptedResponse::ok(&article_body(
            200,
            &["/2026/08/01/second-story", "/politics"],
        ))],
    );

    let mut cfg = test_config("job-a");
    cfg.max_downloads = Some(1);
    let orchestrator = Orchestrator::new(
        cfg,
        store.clone(),
        Arc::new(fetcher),
        Arc::new(HeuristicAnalyzer::new()),
    )
    .unwrap();
    let report = orchestrator.run(&[seed.to_string()], &[]).await.unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.counters.visited, 1);
    assert_eq!(report.counters.downloaded, 1);
    assert_eq!(report.counters.saved, 1);
    assert_eq!(report.counters.errors, 0);
    assert_eq!(report.counters.found, 3);

    // One article-classified fetch, one article row, two typed links.
    let cls: String = sqlx::query_scalar("SELECT classification FROM fetches WHERE url = ?")
        .bind(seed)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(cls, "article");
    assert_eq!(store.count_articles().await.unwrap(), 1);

    let link_types: Vec<String> =
        sqlx::query("SELECT type FROM links WHERE src_url = ? ORDER BY type")
            .bind(seed)
            .fetch_all(store.pool())
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("type"))
            .collect();
    assert_eq!(link_types, vec!["article", "nav"]);

    let types: Vec<String> = event_types(&store, "job-a")
        .await
        .into_iter()
        .map(|(_, t)| t)
        .collect();
    for expected in [
        "crawl:start",
        "url:dequeued",
        "url:fetched",
        "url:saved",
        "links:discovered",
        "crawl:progress",
        "crawl:end",
    ] {
        assert!(types.contains(&expected.to_string()), "missing {expected}");
    }
    assert_eq!(types.iter().filter(|t| *t == "url:enqueued").count(), 2);
    assert_eq!(types.iter().filter(|t| *t == "crawl:end").count(), 1);
}

// Scenario: rate-limited host. First response is a 429 with Retry-After;
// the host is gated, then both URLs succeed.
#[tokio::test]
async fn test_rate_limited_host_backs_off() {
    let url_a = "http://ratey.example.com/a";
    let url_b = "http://ratey.example.com/b";
    let store = Store::open_memory().await.unwrap();
    let fetcher = ScriptedFetcher::new(Duration::ZERO)
        .script(
            url_a,
            vec![ScriptedResponse::rate_limited(1), ScriptedResponse::ok("<html><body>a</body></html>")],
        )
        .script(url_b, vec![ScriptedResponse::ok("<html><body>b</body></html>")]);

    let mut cfg = test_config("job-b");
    cfg.concurrency = 2;
    let orchestrator = Orchestrator::new(
        cfg,
        store.clone(),
        Arc::new(fetcher),
        Arc::new(HeuristicAnalyzer::new()),
    )
    .unwrap();

    let started = Instant::now();
    let report = orchestrator
        .run(&[url_a.to_string(), url_b.to_string()], &[])
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.counters.visited, 2);
    // The whole host was held off until the Retry-After elapsed.
    assert!(started.elapsed() >= Duration::from_secs(1));

    let statuses: Vec<i64> =
        sqlx::query("SELECT http_status FROM fetches ORDER BY id")
            .fetch_all(store.pool())
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("http_status"))
            .collect();
    assert!(statuses.contains(&429));
    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 2);

    // rate:limit problem row and warn-severity event.
    let problems: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM problems WHERE kind = 'rate:limit'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(problems, 1);
    let severity: String = sqlx::query_scalar(
        "SELECT severity FROM task_events WHERE task_id = 'job-b' AND event_type = 'rate:limit'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(severity, "warn");

    let requeued: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM queue_events WHERE job_id = 'job-b' AND action = 'requeued'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(requeued, 1);
}

// Scenario: the analyzer raises. The fetch survives with classification
// `other`, no article row, one parse error, and the crawl completes.
#[tokio::test]
async fn test_parser_error_preserves_fetch() {
    let seed = "http://news.example.com/broken";
    let store = Store::open_memory().await.unwrap();
    let fetcher = ScriptedFetcher::new(Duration::ZERO)
        .script(seed, vec![ScriptedResponse::ok("<html>whatever</html>")]);

    let orchestrator = Orchestrator::new(
        test_config("job-c"),
        store.clone(),
        Arc::new(fetcher),
        Arc::new(FailingAnalyzer),
    )
    .unwrap();
    let report = orchestrator.run(&[seed.to_string()], &[]).await.unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.counters.errors, 1);

    let cls: String = sqlx::query_scalar("SELECT classification FROM fetches WHERE url = ?")
        .bind(seed)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(cls, "other");
    assert_eq!(store.count_articles().await.unwrap(), 0);

    let kind: String = sqlx::query_scalar("SELECT kind FROM errors")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(kind, "parse");

    let row = sqlx::query(
        "SELECT event_category, severity FROM task_events
         WHERE task_id = 'job-c' AND event_type = 'parse:error'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    let category: String = row.get("event_category");
    let severity: String = row.get("severity");
    assert_eq!(category, "error");
    assert_eq!(severity, "warn");
}

// Scenario: pause/resume. No dequeues happen while paused, and the final
// totals match an uninterrupted run over the same inputs.
#[tokio::test]
async fn test_pause_and_resume() {
    let hub = "http://news.example.com/";
    let stories = [
        "http://news.example.com/2026/08/01/story-one-lands",
        "http://news.example.com/2026/08/01/story-two-lands",
        "http://news.example.com/2026/08/01/story-three-lands",
    ];
    let hub_body = article_body(
        5,
        &[
            "/2026/08/01/story-one-lands",
            "/2026/08/01/story-two-lands",
            "/2026/08/01/story-three-lands",
        ],
    );

    let build_fetcher = || {
        let mut fetcher = ScriptedFetcher::new(Duration::from_millis(30))
            .script(hub, vec![ScriptedResponse::ok(&hub_body)]);
        for story in &stories {
            fetcher = fetcher.script(story, vec![ScriptedResponse::ok(&article_body(100, &[]))]);
        }
        fetcher
    };

    // Reference run, uninterrupted.
    let ref_store = Store::open_memory().await.unwrap();
    let reference = Orchestrator::new(
        test_config("job-d-ref"),
        ref_store.clone(),
        Arc::new(build_fetcher()),
        Arc::new(HeuristicAnalyzer::new()),
    )
    .unwrap();
    let ref_report = reference.run(&[hub.to_string()], &[]).await.unwrap();

    // Interrupted run.
    let store = Store::open_memory().await.unwrap();
    let orchestrator = Arc::new(
        Orchestrator::new(
            test_config("job-d"),
            store.clone(),
            Arc::new(build_fetcher()),
            Arc::new(HeuristicAnalyzer::new()),
        )
        .unwrap(),
    );
    let handle = orchestrator.handle();
    let mut events = orchestrator.bus().subscribe();

    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(&[hub.to_string()], &[]).await })
    };

    // Pause as soon as the first item is dequeued (the worker is then
    // inside its 30ms fetch).
    loop {
        let event = events.recv().await.unwrap();
        if matches!(event.payload, EventPayload::UrlDequeued { .. }) {
            break;
        }
    }
    handle.pause().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.resume().await;

    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.counters.visited, ref_report.counters.visited);
    assert_eq!(report.counters.saved, ref_report.counters.saved);
    assert_eq!(report.counters.found, ref_report.counters.found);
    assert_eq!(report.counters.errors, 0);

    // The durable log shows no dequeue between pause and resume.
    let events = event_types(&store, "job-d").await;
    let pause_seq = events.iter().find(|(_, t)| t == "crawl:pause").unwrap().0;
    let resume_seq = events.iter().find(|(_, t)| t == "crawl:resume").unwrap().0;
    assert!(pause_seq < resume_seq);
    let between: Vec<_> = events
        .iter()
        .filter(|(seq, t)| *seq > pause_seq && *seq < resume_seq && t == "url:dequeued")
        .collect();
    assert!(between.is_empty(), "dequeues while paused: {between:?}");
}

// Scenario: stop with grace. In-flight work completes and persists, no
// dequeues happen after the stop, and the job row ends as stopped.
#[tokio::test]
async fn test_stop_drains_in_flight() {
    let hub = "http://news.example.com/";
    let mut links = Vec::new();
    let mut hrefs = Vec::new();
    for i in 0..8 {
        links.push(format!("http://news.example.com/2026/08/01/story-{i}-lands"));
        hrefs.push(format!("/2026/08/01/story-{i}-lands"));
    }
    let href_refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();

    let mut fetcher = ScriptedFetcher::new(Duration::from_millis(30))
        .script(hub, vec![ScriptedResponse::ok(&article_body(5, &href_refs))]);
    for link in &links {
        fetcher = fetcher.script(link, vec![ScriptedResponse::ok(&article_body(100, &[]))]);
    }

    let store = Store::open_memory().await.unwrap();
    let orchestrator = Arc::new(
        Orchestrator::new(
            test_config("job-e"),
            store.clone(),
            Arc::new(fetcher),
            Arc::new(HeuristicAnalyzer::new()),
        )
        .unwrap(),
    );
    let handle = orchestrator.handle();
    let mut events = orchestrator.bus().subscribe();
    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(&[hub.to_string()], &[]).await })
    };

    // Stop while the second dequeued item is in flight.
    let mut dequeues = 0;
    loop {
        let event = events.recv().await.unwrap();
        if matches!(event.payload, EventPayload::UrlDequeued { .. }) {
            dequeues += 1;
            if dequeues == 2 {
                break;
            }
        }
    }
    handle.stop().await;

    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.outcome, Outcome::Stopped);

    let events = event_types(&store, "job-e").await;
    let stop_seq = events.iter().find(|(_, t)| t == "crawl:stop").unwrap().0;
    assert!(events
        .iter()
        .all(|(seq, t)| t != "url:dequeued" || *seq < stop_seq));
    assert_eq!(events.iter().filter(|(_, t)| t == "crawl:end").count(), 1);

    // Both dequeued items persisted their fetches.
    assert_eq!(store.count_fetches().await.unwrap(), 2);

    let job = store.get_crawl_job("job-e").await.unwrap().unwrap();
    assert_eq!(job.status, "stopped");
    assert!(job.ended_at.is_some());
}

// Scenario: EventWriter continuity across writer lifetimes for the same
// job id.
#[tokio::test]
async fn test_event_log_continues_after_restart() {
    let seed = "http://news.example.com/2026/08/01/only-story";
    let store = Store::open_memory().await.unwrap();
    let fetcher = ScriptedFetcher::new(Duration::ZERO)
        .script(seed, vec![ScriptedResponse::ok(&article_body(100, &[]))]);

    let orchestrator = Orchestrator::new(
        test_config("job-f"),
        store.clone(),
        Arc::new(fetcher),
        Arc::new(HeuristicAnalyzer::new()),
    )
    .unwrap();
    orchestrator.run(&[seed.to_string()], &[]).await.unwrap();

    let before = event_types(&store, "job-f").await;
    let max_seq = before.last().unwrap().0;

    // A later process writes more events for the same task.
    let writer = newsreel_telemetry::EventWriter::new(
        store.pool().clone(),
        newsreel_core::config::EventWriterConfig {
            batch_writes: false,
            batch_size: 1,
            flush_interval_ms: 0,
        },
    );
    writer
        .write(newsreel_telemetry::WriteRequest {
            task_type: "crawl".to_string(),
            task_id: "job-f".to_string(),
            event_type: "crawl:start".to_string(),
            ..Default::default()
        })
        .await;
    writer.destroy().await;

    let after = event_types(&store, "job-f").await;
    assert_eq!(after.last().unwrap().0, max_seq + 1);
    // Contiguous: seq 1..=n with no gaps, in insertion order.
    for (i, (seq, _)) in after.iter().enumerate() {
        assert_eq!(*seq, i as i64 + 1);
    }
}

// Retry policy: a persistently failing URL is attempted exactly
// max_attempts times, then shelved with a network error.
#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let seed = "http://flaky.example.com/page";
    let store = Store::open_memory().await.unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new(Duration::ZERO)
            .script(seed, vec![ScriptedResponse::network_error()]),
    );

    let mut cfg = test_config("job-r");
    cfg.retry.max_attempts = 3;
    let orchestrator = Orchestrator::new(
        cfg,
        store.clone(),
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::new(HeuristicAnalyzer::new()),
    )
    .unwrap();
    let report = orchestrator.run(&[seed.to_string()], &[]).await.unwrap();

    assert_eq!(fetcher.calls_for(seed), 3);
    assert_eq!(report.counters.errors, 1);
    assert_eq!(report.outcome, Outcome::Completed);

    let kind: String = sqlx::query_scalar("SELECT kind FROM errors LIMIT 1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(kind, "network");
}

// A 404 is not retried.
#[tokio::test]
async fn test_client_error_not_retried() {
    let seed = "http://news.example.com/missing";
    let store = Store::open_memory().await.unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new(Duration::ZERO).script(seed, vec![ScriptedResponse::status(404)]),
    );

    let orchestrator = Orchestrator::new(
        test_config("job-404"),
        store.clone(),
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::new(HeuristicAnalyzer::new()),
    )
    .unwrap();
    let report = orchestrator.run(&[seed.to_string()], &[]).await.unwrap();

    assert_eq!(fetcher.calls_for(seed), 1);
    assert_eq!(report.counters.errors, 1);
    let kind: String = sqlx::query_scalar("SELECT kind FROM errors LIMIT 1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(kind, "http");
}
