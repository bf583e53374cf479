use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use newsreel_core::CrawlConfig;
use newsreel_crawler::Orchestrator;
use newsreel_fetch::HttpFetcher;
use newsreel_parser::HeuristicAnalyzer;
use newsreel_storage::{Store, StoreOptions};

/// Seed argument: a file path (one URL per line) or a comma-separated
/// list.
fn collect_seeds(arg: Option<String>) -> Result<Vec<String>> {
    let Some(arg) = arg else {
        return Ok(Vec::new());
    };
    if std::path::Path::new(&arg).exists() {
        let content = std::fs::read_to_string(&arg)?;
        Ok(content
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect())
    } else {
        Ok(arg
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

pub async fn run(
    mut config: CrawlConfig,
    seeds: Option<String>,
    seed: Option<String>,
    hub_seeds: Option<String>,
    depth: Option<u32>,
    job_id: Option<String>,
) -> Result<()> {
    if let Some(depth) = depth {
        config.max_depth = depth;
    }
    if job_id.is_some() {
        config.job_id = job_id;
    }

    let mut seed_urls = Vec::new();
    if let Some(s) = seed {
        seed_urls.push(s);
    }
    seed_urls.extend(collect_seeds(seeds)?);
    let hub_urls = collect_seeds(hub_seeds)?;
    if seed_urls.is_empty() && hub_urls.is_empty() {
        anyhow::bail!("no seeds provided (use --seed or --seeds)");
    }

    let store = Store::open(
        &config.db_path,
        StoreOptions {
            max_connections: (config.concurrency as u32 + 3).max(5),
            ..Default::default()
        },
    )
    .await?;

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let analyzer = Arc::new(HeuristicAnalyzer::new());
    let orchestrator = Orchestrator::new(config, store.clone(), fetcher, analyzer)?;
    let handle = orchestrator.handle();

    // First ctrl-c stops gracefully, a second one aborts.
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, draining in-flight work (ctrl-c again to abort)");
            handle.stop().await;
            if signal::ctrl_c().await.is_ok() {
                warn!("aborting");
                handle.abort().await;
            }
        }
    });

    info!(job_id = %orchestrator.job_id(), seeds = seed_urls.len(), hubs = hub_urls.len(), "starting crawl");
    match orchestrator.run(&seed_urls, &hub_urls).await {
        Ok(report) => {
            info!(
                outcome = report.outcome.as_str(),
                visited = report.counters.visited,
                downloaded = report.counters.downloaded,
                saved = report.counters.saved,
                errors = report.counters.errors,
                found = report.counters.found,
                "crawl finished"
            );
            store.close().await;
            Ok(())
        }
        Err(e) => {
            orchestrator.fail(&e.to_string()).await;
            store.close().await;
            Err(e.into())
        }
    }
}
