use newsreel_core::CrawlError;

use crate::rows::{ErrorRecord, FetchRecord, LinkRecord};
use crate::{db_err, Store};

impl Store {
    /// Append one fetch attempt. Never updated afterwards; the triggers
    /// refresh urls, latest_fetch, and domains from it.
    pub async fn insert_fetch(&self, f: &FetchRecord) -> Result<i64, CrawlError> {
        let res = sqlx::query(
            "INSERT INTO fetches (
                 url, host, request_started_at, fetched_at, http_status,
                 content_type, content_length, content_encoding,
                 bytes_downloaded, transfer_kbps, ttfb_ms, download_ms,
                 total_ms, saved_to_db, saved_to_file, file_path, file_size,
                 classification, nav_links_count, article_links_count,
                 word_count, analysis
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&f.url)
        .bind(&f.host)
        .bind(&f.request_started_at)
        .bind(&f.fetched_at)
        .bind(f.http_status)
        .bind(&f.content_type)
        .bind(f.content_length)
        .bind(&f.content_encoding)
        .bind(f.bytes_downloaded)
        .bind(f.transfer_kbps)
        .bind(f.ttfb_ms)
        .bind(f.download_ms)
        .bind(f.total_ms)
        .bind(f.saved_to_db)
        .bind(f.saved_to_file)
        .bind(&f.file_path)
        .bind(f.file_size)
        .bind(&f.classification)
        .bind(f.nav_links_count)
        .bind(f.article_links_count)
        .bind(f.word_count)
        .bind(&f.analysis)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(res.last_insert_rowid())
    }

    /// Idempotent over (src_url, dst_url, type).
    pub async fn insert_link(&self, l: &LinkRecord) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT OR IGNORE INTO links
                 (src_url, dst_url, anchor, rel, type, depth, on_domain, discovered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&l.src_url)
        .bind(&l.dst_url)
        .bind(&l.anchor)
        .bind(&l.rel)
        .bind(&l.link_type)
        .bind(l.depth)
        .bind(l.on_domain)
        .bind(&l.discovered_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn insert_error(&self, e: &ErrorRecord) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO errors (url, host, kind, code, message, details, at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&e.url)
        .bind(&e.host)
        .bind(&e.kind)
        .bind(e.code)
        .bind(&e.message)
        .bind(&e.details)
        .bind(&e.at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    fn fetch(url: &str, fetched_at: &str, status: i64) -> FetchRecord {
        FetchRecord {
            url: url.to_string(),
            host: Some("news.example.com".to_string()),
            request_started_at: Some("2026-08-01T10:00:00Z".to_string()),
            fetched_at: Some(fetched_at.to_string()),
            http_status: Some(status),
            classification: Some("article".to_string()),
            word_count: Some(120),
            bytes_downloaded: Some(2048),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_insert_creates_url_row() {
        let store = Store::open_memory().await.unwrap();
        store
            .insert_fetch(&fetch("http://news.example.com/f/1", "2026-08-01T10:00:01Z", 200))
            .await
            .unwrap();
        assert!(store.has_url("http://news.example.com/f/1").await.unwrap());
        let host: Option<String> = sqlx::query_scalar("SELECT host FROM urls WHERE url = ?")
            .bind("http://news.example.com/f/1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(host.as_deref(), Some("news.example.com"));
    }

    #[tokio::test]
    async fn test_latest_fetch_tracks_maximum() {
        let store = Store::open_memory().await.unwrap();
        let url = "http://news.example.com/f/2";
        store
            .insert_fetch(&fetch(url, "2026-08-01T10:00:05Z", 200))
            .await
            .unwrap();
        // An older attempt arriving late must not win.
        store
            .insert_fetch(&fetch(url, "2026-08-01T09:00:00Z", 500))
            .await
            .unwrap();
        let row = sqlx::query("SELECT ts, http_status FROM latest_fetch WHERE url = ?")
            .bind(url)
            .fetch_one(store.pool())
            .await
            .unwrap();
        let ts: String = row.get("ts");
        let status: i64 = row.get("http_status");
        assert_eq!(ts, "2026-08-01T10:00:05Z");
        assert_eq!(status, 200);

        // A newer attempt replaces it.
        store
            .insert_fetch(&fetch(url, "2026-08-01T11:00:00Z", 304))
            .await
            .unwrap();
        let status: i64 = sqlx::query_scalar("SELECT http_status FROM latest_fetch WHERE url = ?")
            .bind(url)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(status, 304);
    }

    #[tokio::test]
    async fn test_fetches_are_append_only_many_per_url() {
        let store = Store::open_memory().await.unwrap();
        let url = "http://news.example.com/f/3";
        for i in 0..3 {
            store
                .insert_fetch(&fetch(url, &format!("2026-08-01T10:00:0{i}Z"), 200))
                .await
                .unwrap();
        }
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fetches WHERE url = ?")
            .bind(url)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(n, 3);
        // Exactly one urls row regardless.
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE url = ?")
            .bind(url)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_link_insert_is_idempotent() {
        let store = Store::open_memory().await.unwrap();
        let link = LinkRecord {
            src_url: "http://a/src".to_string(),
            dst_url: "http://a/dst".to_string(),
            link_type: Some("article".to_string()),
            on_domain: Some(true),
            discovered_at: "2026-08-01T10:00:00Z".to_string(),
            ..Default::default()
        };
        for _ in 0..4 {
            store.insert_link(&link).await.unwrap();
        }
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(n, 1);

        // Same edge with a different type is a distinct row.
        let mut nav = link.clone();
        nav.link_type = Some("nav".to_string());
        store.insert_link(&nav).await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(n, 2);
    }
}
