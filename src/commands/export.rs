use std::io::Write;

use anyhow::Result;
use tracing::info;

use newsreel_core::CrawlConfig;
use newsreel_storage::{Store, StoreOptions};

/// Stream article URLs into a JSON-lines file, one batch at a time.
pub async fn run(config: CrawlConfig, output: &str, batch_size: i64) -> Result<()> {
    let store = Store::open(
        &config.db_path,
        StoreOptions {
            readonly: true,
            max_connections: 1,
            ..Default::default()
        },
    )
    .await?;

    let mut file = std::fs::File::create(output)?;
    let mut stream = store.stream_article_urls(batch_size);
    let mut exported = 0u64;
    loop {
        let batch = stream.next_batch().await?;
        if batch.is_empty() {
            break;
        }
        for url in batch {
            writeln!(file, "{}", serde_json::json!({ "url": url }))?;
            exported += 1;
        }
    }
    file.flush()?;

    info!(exported, output, "export complete");
    store.close().await;
    Ok(())
}
