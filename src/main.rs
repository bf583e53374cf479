mod cli;
mod commands;
mod worker_proto;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// Use mimalloc to keep memory flat with many concurrent workers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use newsreel_core::CrawlConfig;

use crate::cli::{Cli, Commands};

/// Keys accepted at the top level of the config file; anything else gets a
/// warning and is ignored.
const KNOWN_KEYS: &[&str] = &[
    "job_id",
    "db_path",
    "concurrency",
    "max_depth",
    "max_pages_per_domain",
    "max_downloads",
    "crawl_timeout_ms",
    "per_host_min_interval_ms",
    "per_host_interval_overrides",
    "per_host_concurrency",
    "retry",
    "same_site_policy",
    "link_type_filter",
    "prefer_cache",
    "output_verbosity",
    "progress_interval_ms",
    "fetch",
    "queue",
    "priority",
    "events",
    "backoff",
];

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

fn load_config(path: &str) -> Result<CrawlConfig> {
    let config_str = std::fs::read_to_string(path).unwrap_or_else(|_| {
        warn!(path = %path, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let value: toml::Value = toml::from_str(&config_str)?;
    if let Some(table) = value.as_table() {
        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "unknown config key ignored");
            }
        }
    }
    let mut config: CrawlConfig = value.try_into()?;

    // Environment overrides for quick tuning.
    if let Ok(v) = std::env::var("NEWSREEL_CONCURRENCY") {
        if let Ok(n) = v.parse::<usize>() {
            if n >= 1 && n <= 128 {
                config.concurrency = n;
            }
        }
    }
    if let Ok(v) = std::env::var("NEWSREEL_MAX_DEPTH") {
        if let Ok(n) = v.parse::<u32>() {
            config.max_depth = n;
        }
    }
    if let Ok(v) = std::env::var("NEWSREEL_DB") {
        if !v.is_empty() {
            config.db_path = v;
        }
    }
    Ok(config)
}

async fn async_main() -> Result<()> {
    // Diagnostics go to stderr; stdout belongs to the worker protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Crawl {
            seeds,
            seed,
            hub_seeds,
            depth,
            job_id,
        } => {
            commands::crawl::run(config, seeds, seed, hub_seeds, depth, job_id).await?;
        }
        Commands::Worker => {
            let code = worker_proto::run(config).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
        Commands::Export { output, batch_size } => {
            commands::export::run(config, &output, batch_size).await?;
        }
    }

    Ok(())
}
