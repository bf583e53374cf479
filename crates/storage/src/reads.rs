use sqlx::{Row, SqlitePool};

use newsreel_core::CrawlError;

use crate::{db_err, Store};

/// Lazy, restartable walk over article URLs in key order. The consumer
/// drives it batch by batch; nothing is buffered beyond one batch.
pub struct ArticleUrlStream {
    pool: SqlitePool,
    cursor: Option<String>,
    batch_size: i64,
    exhausted: bool,
}

impl ArticleUrlStream {
    pub(crate) fn new(pool: SqlitePool, batch_size: i64) -> Self {
        Self {
            pool,
            cursor: None,
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    /// Next batch of URLs; empty when the walk is done. A new stream can
    /// be started at any time to restart from the beginning.
    pub async fn next_batch(&mut self) -> Result<Vec<String>, CrawlError> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        let rows = match &self.cursor {
            None => sqlx::query("SELECT url FROM articles ORDER BY url LIMIT ?")
                .bind(self.batch_size)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?,
            Some(cursor) => sqlx::query("SELECT url FROM articles WHERE url > ? ORDER BY url LIMIT ?")
                .bind(cursor)
                .bind(self.batch_size)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?,
        };
        let urls: Vec<String> = rows.iter().map(|r| r.get("url")).collect();
        match urls.last() {
            Some(last) => self.cursor = Some(last.clone()),
            None => self.exhausted = true,
        }
        Ok(urls)
    }
}

impl Store {
    pub fn stream_article_urls(&self, batch_size: i64) -> ArticleUrlStream {
        ArticleUrlStream::new(self.pool.clone(), batch_size)
    }

    pub async fn count_articles(&self) -> Result<i64, CrawlError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn count_fetches(&self) -> Result<i64, CrawlError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM fetches")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn count_urls(&self) -> Result<i64, CrawlError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM urls")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn count_links(&self) -> Result<i64, CrawlError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM links")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn count_errors(&self) -> Result<i64, CrawlError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM errors")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::ArticleRecord;

    #[tokio::test]
    async fn test_stream_batches_in_order_without_overlap() {
        let store = Store::open_memory().await.unwrap();
        for i in 0..7 {
            store
                .upsert_article(&ArticleRecord {
                    url: format!("http://news.example.com/a/{i}"),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let mut stream = store.stream_article_urls(3);
        let mut all = Vec::new();
        loop {
            let batch = stream.next_batch().await.unwrap();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 3);
            all.extend(batch);
        }
        assert_eq!(all.len(), 7);
        let mut sorted = all.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(all, sorted);
    }

    #[tokio::test]
    async fn test_stream_on_empty_store() {
        let store = Store::open_memory().await.unwrap();
        let mut stream = store.stream_article_urls(10);
        assert!(stream.next_batch().await.unwrap().is_empty());
        assert!(stream.next_batch().await.unwrap().is_empty());
    }
}
