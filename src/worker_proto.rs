use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use newsreel_core::config::Verbosity;
use newsreel_core::events::EventPayload;
use newsreel_core::CrawlConfig;
use newsreel_crawler::Orchestrator;
use newsreel_fetch::HttpFetcher;
use newsreel_parser::HeuristicAnalyzer;
use newsreel_storage::{Store, StoreOptions};

/// Subprocess deployment: one JSON line in (`start` with config, or
/// `stop`), JSON lines out (`log`, `progress`, `complete`, `error`).
/// Stdout carries only protocol lines; diagnostics go to stderr.
pub async fn run(base: CrawlConfig) -> Result<i32> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let start = loop {
        let Some(line) = lines.next_line().await? else {
            return Ok(0);
        };
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                println!("{}", json!({"type": "error", "message": format!("bad input: {e}")}));
                continue;
            }
        };
        match value.get("type").and_then(|t| t.as_str()) {
            Some("start") => break value,
            Some("stop") => {
                println!("{}", json!({"type": "complete", "outcome": "stopped"}));
                return Ok(0);
            }
            other => {
                println!(
                    "{}",
                    json!({"type": "error", "message": format!("unknown message type: {other:?}")})
                );
            }
        }
    };

    let config: CrawlConfig = match start.get("config") {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(config) => config,
            Err(e) => {
                println!("{}", json!({"type": "error", "message": format!("bad config: {e}")}));
                return Ok(1);
            }
        },
        None => base,
    };
    let string_list = |key: &str| -> Vec<String> {
        start
            .get(key)
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    let seeds = string_list("seeds");
    let hub_seeds = string_list("hub_seeds");
    if seeds.is_empty() && hub_seeds.is_empty() {
        println!("{}", json!({"type": "error", "message": "start message carries no seeds"}));
        return Ok(1);
    }

    let store = match Store::open(
        &config.db_path,
        StoreOptions {
            max_connections: (config.concurrency as u32 + 3).max(5),
            ..Default::default()
        },
    )
    .await
    {
        Ok(store) => store,
        Err(e) => {
            println!("{}", json!({"type": "error", "message": e.to_string()}));
            return Ok(1);
        }
    };

    let verbosity = config.output_verbosity;
    let orchestrator = match HttpFetcher::new(&config.fetch)
        .map_err(anyhow::Error::from)
        .and_then(|fetcher| {
            Orchestrator::new(
                config,
                store.clone(),
                Arc::new(fetcher),
                Arc::new(HeuristicAnalyzer::new()),
            )
            .map_err(anyhow::Error::from)
        }) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            println!("{}", json!({"type": "error", "message": e.to_string()}));
            return Ok(1);
        }
    };

    let handle = orchestrator.handle();
    let mut bus_rx = orchestrator.bus().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match bus_rx.recv().await {
                Ok(event) => match &event.payload {
                    EventPayload::Progress(c) => println!(
                        "{}",
                        json!({
                            "type": "progress",
                            "visited": c.visited,
                            "downloaded": c.downloaded,
                            "saved": c.saved,
                            "errors": c.errors,
                            "found": c.found,
                            "queued": c.queue_size,
                        })
                    ),
                    EventPayload::CrawlEnd { .. } => {}
                    payload => {
                        if verbosity != Verbosity::Silent && verbosity != Verbosity::ExtraTerse {
                            println!(
                                "{}",
                                json!({
                                    "type": "log",
                                    "event": payload.event_type(),
                                    "data": payload.data(),
                                })
                            );
                        }
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "protocol printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!(job_id = %orchestrator.job_id(), "worker crawl starting");
    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(&seeds, &hub_seeds).await })
    };

    // Control messages until stdin closes. EOF is not a stop request.
    let control = tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            match value.get("type").and_then(|t| t.as_str()) {
                Some("stop") => handle.stop().await,
                Some("abort") => handle.abort().await,
                _ => {}
            }
        }
    });

    let outcome = runner.await;
    control.abort();
    printer.abort();
    match outcome {
        Ok(Ok(report)) => {
            println!(
                "{}",
                json!({
                    "type": "complete",
                    "outcome": report.outcome.as_str(),
                    "jobId": report.job_id,
                    "visited": report.counters.visited,
                    "downloaded": report.counters.downloaded,
                    "saved": report.counters.saved,
                    "errors": report.counters.errors,
                    "found": report.counters.found,
                })
            );
            store.close().await;
            Ok(0)
        }
        Ok(Err(e)) => {
            orchestrator.fail(&e.to_string()).await;
            println!("{}", json!({"type": "error", "message": e.to_string()}));
            store.close().await;
            Ok(1)
        }
        Err(join_error) => {
            println!("{}", json!({"type": "error", "message": join_error.to_string()}));
            store.close().await;
            Ok(1)
        }
    }
}
