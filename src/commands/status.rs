use anyhow::Result;

use newsreel_core::CrawlConfig;
use newsreel_storage::{Store, StoreOptions};

pub async fn run(config: CrawlConfig) -> Result<()> {
    if !std::path::Path::new(&config.db_path).exists() {
        println!("No database at {} yet", config.db_path);
        return Ok(());
    }

    let store = Store::open(
        &config.db_path,
        StoreOptions {
            readonly: true,
            max_connections: 1,
            ..Default::default()
        },
    )
    .await?;

    let urls = store.count_urls().await?;
    let fetches = store.count_fetches().await?;
    let articles = store.count_articles().await?;
    let links = store.count_links().await?;
    let errors = store.count_errors().await?;

    println!("Database: {}", config.db_path);
    println!("  urls:     {urls:>10}");
    println!("  fetches:  {fetches:>10}");
    println!("  articles: {articles:>10}");
    println!("  links:    {links:>10}");
    println!("  errors:   {errors:>10}");

    let jobs = store.recent_jobs(10).await?;
    if !jobs.is_empty() {
        println!("\nRecent jobs:");
        for job in jobs {
            println!(
                "  {:<32} {:<9} started {} ended {}",
                job.id,
                job.status,
                job.started_at,
                job.ended_at.as_deref().unwrap_or("-")
            );
        }
    }

    store.close().await;
    Ok(())
}
