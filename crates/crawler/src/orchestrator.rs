use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{watch, Notify};
use tracing::{error, info, warn};

use newsreel_core::config::CrawlConfig;
use newsreel_core::events::{EventPayload, Outcome, ProgressCounters};
use newsreel_core::urlnorm;
use newsreel_core::{Analyzer, CrawlError, Fetcher, JobStatus, QueueItem, QueueItemKind};
use newsreel_frontier::{Frontier, HostLimiter, HostLimiterConfig};
use newsreel_storage::Store;
use newsreel_telemetry::{EventWriter, TelemetryBus};

use crate::control::{CrawlHandle, DesiredState};
use crate::worker::{worker, Counters, Shared};

/// What a finished crawl reports back to its caller.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub job_id: String,
    pub outcome: Outcome,
    pub counters: ProgressCounters,
}

/// Owns the queue, the limiter, and the job row for one run; drives the
/// worker pool through the Running/Paused/Stopping/Aborting state machine.
pub struct Orchestrator {
    cfg: CrawlConfig,
    store: Store,
    bus: TelemetryBus,
    writer: Arc<EventWriter>,
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<dyn Analyzer>,
    desired: Arc<watch::Sender<DesiredState>>,
    job_id: String,
}

impl Orchestrator {
    pub fn new(
        cfg: CrawlConfig,
        store: Store,
        fetcher: Arc<dyn Fetcher>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self, CrawlError> {
        if cfg.concurrency == 0 {
            return Err(CrawlError::Config("concurrency must be at least 1".into()));
        }
        let job_id = cfg.job_id_or_generated(Utc::now());
        let writer = EventWriter::new(store.pool().clone(), cfg.events.clone());
        let (desired, _) = watch::channel(DesiredState::Running);
        Ok(Self {
            cfg,
            store,
            bus: TelemetryBus::default(),
            writer,
            fetcher,
            analyzer,
            desired: Arc::new(desired),
            job_id,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn bus(&self) -> &TelemetryBus {
        &self.bus
    }

    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle::new(
            Arc::clone(&self.desired),
            self.bus.clone(),
            Arc::clone(&self.writer),
            self.job_id.clone(),
        )
    }

    /// Run the job to its terminal state. `hub_seeds` are caller-provided
    /// section/front pages enqueued alongside ordinary seeds with their
    /// own priority class.
    pub async fn run(
        &self,
        seeds: &[String],
        hub_seeds: &[String],
    ) -> Result<CrawlReport, CrawlError> {
        let started_at = Utc::now().to_rfc3339();
        let args = serde_json::json!({
            "concurrency": self.cfg.concurrency,
            "max_depth": self.cfg.max_depth,
            "seeds": seeds.len(),
            "hub_seeds": hub_seeds.len(),
        });
        self.store
            .record_crawl_job_start(
                &self.job_id,
                seeds.first().map(String::as_str),
                Some(&args.to_string()),
                Some(std::process::id() as i64),
                &started_at,
                JobStatus::Running.as_str(),
            )
            .await?;

        let shared = Arc::new(Shared {
            cfg: self.cfg.clone(),
            job_id: self.job_id.clone(),
            store: self.store.clone(),
            bus: self.bus.clone(),
            writer: Arc::clone(&self.writer),
            frontier: Frontier::new(self.cfg.queue.max_size),
            limiter: HostLimiter::new(HostLimiterConfig::from_crawl_config(&self.cfg)),
            fetcher: Arc::clone(&self.fetcher),
            analyzer: Arc::clone(&self.analyzer),
            desired_tx: Arc::clone(&self.desired),
            counters: Counters::default(),
            in_flight: AtomicUsize::new(0),
            notify: Notify::new(),
            complete: AtomicBool::new(false),
            goal_reached: AtomicBool::new(false),
            domain_pages: DashMap::new(),
            last_progress: Mutex::new(Instant::now()),
        });

        let mut seeded = Vec::new();
        self.seed(&shared, hub_seeds, QueueItemKind::HubSeed, &mut seeded)
            .await;
        self.seed(&shared, seeds, QueueItemKind::Seed, &mut seeded).await;
        info!(job_id = %self.job_id, seeds = seeded.len(), "seeds loaded");

        shared
            .emit(EventPayload::CrawlStart {
                seeds: seeded,
                concurrency: self.cfg.concurrency,
            })
            .await;

        // Job-level time budget.
        let watchdog = self.cfg.crawl_timeout_ms.map(|timeout_ms| {
            let desired = Arc::clone(&self.desired);
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
                let stopped = desired.send_if_modified(|state| {
                    if matches!(*state, DesiredState::Running | DesiredState::Paused) {
                        *state = DesiredState::Stopping;
                        true
                    } else {
                        false
                    }
                });
                if stopped {
                    warn!(timeout_ms, "crawl timeout reached, stopping");
                    shared
                        .emit(EventPayload::Other {
                            event_type: "crawl:stop".to_string(),
                            data: serde_json::json!({ "reason": "timeout" }),
                        })
                        .await;
                }
            })
        });

        // Mirror pause/resume/stopping into the job row.
        let mirror = {
            let store = self.store.clone();
            let job_id = self.job_id.clone();
            let mut rx = self.desired.subscribe();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let status = match *rx.borrow() {
                        DesiredState::Running => JobStatus::Running,
                        DesiredState::Paused => JobStatus::Paused,
                        DesiredState::Stopping | DesiredState::Aborting => JobStatus::Stopping,
                    };
                    if let Err(e) = store
                        .mark_crawl_job_status(&job_id, None, status.as_str())
                        .await
                    {
                        warn!("job status mirror failed: {e}");
                    }
                }
            })
        };

        let mut handles = Vec::with_capacity(self.cfg.concurrency);
        for worker_id in 0..self.cfg.concurrency {
            handles.push(tokio::spawn(worker(Arc::clone(&shared), worker_id)));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker panicked: {e}");
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        mirror.abort();

        let outcome = if *self.desired.borrow() == DesiredState::Aborting {
            Outcome::Aborted
        } else if shared.complete.load(Ordering::SeqCst)
            || shared.goal_reached.load(Ordering::SeqCst)
        {
            Outcome::Completed
        } else {
            Outcome::Stopped
        };
        let status = match outcome {
            Outcome::Completed => JobStatus::Done,
            Outcome::Stopped => JobStatus::Stopped,
            Outcome::Aborted => JobStatus::Aborted,
            Outcome::Failed => JobStatus::Failed,
        };

        let counters = shared.counters.snapshot(shared.frontier.size() as u64);
        shared.emit(EventPayload::Progress(counters)).await;
        shared
            .emit(EventPayload::CrawlEnd { outcome, counters })
            .await;
        self.store
            .insert_milestone(&newsreel_storage::DiagnosticRecord {
                job_id: self.job_id.clone(),
                kind: "crawl:end".to_string(),
                message: Some(format!(
                    "{} after {} pages, {} articles, {} errors",
                    outcome.as_str(),
                    counters.visited,
                    counters.saved,
                    counters.errors
                )),
                ts: Utc::now().to_rfc3339(),
                ..Default::default()
            })
            .await;
        if let Err(e) = self
            .store
            .mark_crawl_job_status(&self.job_id, Some(&Utc::now().to_rfc3339()), status.as_str())
            .await
        {
            warn!("terminal job status write failed: {e}");
        }
        self.writer.destroy().await;

        info!(job_id = %self.job_id, outcome = outcome.as_str(),
              visited = counters.visited, saved = counters.saved, errors = counters.errors,
              "crawl finished");
        Ok(CrawlReport {
            job_id: self.job_id.clone(),
            outcome,
            counters,
        })
    }

    /// Mark the job failed after an orchestrator-level error, emitting the
    /// mandatory final event.
    pub async fn fail(&self, message: &str) {
        let counters = ProgressCounters::default();
        let event = newsreel_core::events::CrawlEvent::now(
            &self.job_id,
            EventPayload::CrawlEnd {
                outcome: Outcome::Failed,
                counters,
            },
        );
        self.bus.publish(event.clone());
        self.writer.write_event(&event).await;
        let _ = self
            .store
            .mark_crawl_job_status(
                &self.job_id,
                Some(&Utc::now().to_rfc3339()),
                JobStatus::Failed.as_str(),
            )
            .await;
        self.writer.destroy().await;
        error!(job_id = %self.job_id, "crawl failed: {message}");
    }

    async fn seed(
        &self,
        shared: &Arc<Shared>,
        urls: &[String],
        kind: QueueItemKind,
        seeded: &mut Vec<String>,
    ) {
        for raw in urls {
            let normalized = match urlnorm::normalize(raw) {
                Ok(n) => n,
                Err(e) => {
                    warn!(url = %raw, "seed rejected: {e}");
                    let _ = self
                        .store
                        .insert_error(&newsreel_storage::ErrorRecord {
                            url: Some(raw.clone()),
                            kind: newsreel_core::ErrorKind::Other.as_str().to_string(),
                            message: Some(e.to_string()),
                            at: Utc::now().to_rfc3339(),
                            ..Default::default()
                        })
                        .await;
                    continue;
                }
            };
            let Some(host) = urlnorm::host_of(&normalized) else {
                continue;
            };
            let priority = newsreel_frontier::priority::score(
                &self.cfg.priority,
                kind,
                0,
                Some(kind.as_str()),
                0.0,
                0.0,
            );
            let accepted = shared.frontier.enqueue(QueueItem {
                url: normalized.clone(),
                host: host.clone(),
                depth: 0,
                kind,
                priority,
                discovery_method: Some(kind.as_str().to_string()),
                referrer: None,
                attempt: 0,
                allow_revisit: false,
            });
            if accepted {
                shared.counters.found.fetch_add(1, Ordering::Relaxed);
                let _ = self.store.touch_url(&normalized, Some(&host), None).await;
                shared
                    .queue_event(
                        "enqueued",
                        Some(&normalized),
                        Some(0),
                        Some(&host),
                        None,
                        Some(kind.as_str()),
                    )
                    .await;
                seeded.push(normalized);
            }
        }
    }
}
