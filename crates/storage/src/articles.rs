use sqlx::Row;

use newsreel_core::CrawlError;

use crate::rows::{ArticleHeaders, ArticleRecord};
use crate::{db_err, now_rfc3339, Store};

fn article_from_row(row: &sqlx::sqlite::SqliteRow) -> ArticleRecord {
    ArticleRecord {
        url: row.get("url"),
        host: row.get("host"),
        title: row.get("title"),
        date: row.get("date"),
        section: row.get("section"),
        html: row.get("html"),
        crawled_at: row.get("crawled_at"),
        canonical_url: row.get("canonical_url"),
        referrer_url: row.get("referrer_url"),
        discovered_at: row.get("discovered_at"),
        crawl_depth: row.get("crawl_depth"),
        fetched_at: row.get("fetched_at"),
        http_status: row.get("http_status"),
        content_length: row.get("content_length"),
        etag: row.get("etag"),
        last_modified: row.get("last_modified"),
        redirect_chain: row.get("redirect_chain"),
        ttfb_ms: row.get("ttfb_ms"),
        download_ms: row.get("download_ms"),
        total_ms: row.get("total_ms"),
        bytes_downloaded: row.get("bytes_downloaded"),
        transfer_kbps: row.get("transfer_kbps"),
        html_sha256: row.get("html_sha256"),
        text: row.get("text"),
        word_count: row.get("word_count"),
        language: row.get("language"),
        article_xpath: row.get("article_xpath"),
        analysis: row.get("analysis"),
    }
}

impl Store {
    /// Upsert one article row. On conflict every incoming non-null value
    /// overwrites the stored one; nulls leave existing data alone, so a
    /// re-crawl never erases what it could not refresh.
    pub async fn upsert_article(&self, a: &ArticleRecord) -> Result<(), CrawlError> {
        sqlx::query(
            r#"INSERT INTO articles (
                   url, host, title, date, section, html, crawled_at,
                   canonical_url, referrer_url, discovered_at, crawl_depth,
                   fetched_at, http_status, content_length, etag, last_modified,
                   redirect_chain, ttfb_ms, download_ms, total_ms,
                   bytes_downloaded, transfer_kbps, html_sha256, text,
                   word_count, language, article_xpath, analysis
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(url) DO UPDATE SET
                   host            = COALESCE(excluded.host, articles.host),
                   title           = COALESCE(excluded.title, articles.title),
                   date            = COALESCE(excluded.date, articles.date),
                   section         = COALESCE(excluded.section, articles.section),
                   html            = COALESCE(excluded.html, articles.html),
                   crawled_at      = COALESCE(excluded.crawled_at, articles.crawled_at),
                   canonical_url   = COALESCE(excluded.canonical_url, articles.canonical_url),
                   referrer_url    = COALESCE(excluded.referrer_url, articles.referrer_url),
                   discovered_at   = COALESCE(excluded.discovered_at, articles.discovered_at),
                   crawl_depth     = COALESCE(excluded.crawl_depth, articles.crawl_depth),
                   fetched_at      = COALESCE(excluded.fetched_at, articles.fetched_at),
                   http_status     = COALESCE(excluded.http_status, articles.http_status),
                   content_length  = COALESCE(excluded.content_length, articles.content_length),
                   etag            = COALESCE(excluded.etag, articles.etag),
                   last_modified   = COALESCE(excluded.last_modified, articles.last_modified),
                   redirect_chain  = COALESCE(excluded.redirect_chain, articles.redirect_chain),
                   ttfb_ms         = COALESCE(excluded.ttfb_ms, articles.ttfb_ms),
                   download_ms     = COALESCE(excluded.download_ms, articles.download_ms),
                   total_ms        = COALESCE(excluded.total_ms, articles.total_ms),
                   bytes_downloaded = COALESCE(excluded.bytes_downloaded, articles.bytes_downloaded),
                   transfer_kbps   = COALESCE(excluded.transfer_kbps, articles.transfer_kbps),
                   html_sha256     = COALESCE(excluded.html_sha256, articles.html_sha256),
                   text            = COALESCE(excluded.text, articles.text),
                   word_count      = COALESCE(excluded.word_count, articles.word_count),
                   language        = COALESCE(excluded.language, articles.language),
                   article_xpath   = COALESCE(excluded.article_xpath, articles.article_xpath),
                   analysis        = COALESCE(excluded.analysis, articles.analysis)"#,
        )
        .bind(&a.url)
        .bind(&a.host)
        .bind(&a.title)
        .bind(&a.date)
        .bind(&a.section)
        .bind(&a.html)
        .bind(&a.crawled_at)
        .bind(&a.canonical_url)
        .bind(&a.referrer_url)
        .bind(&a.discovered_at)
        .bind(a.crawl_depth)
        .bind(&a.fetched_at)
        .bind(a.http_status)
        .bind(a.content_length)
        .bind(&a.etag)
        .bind(&a.last_modified)
        .bind(&a.redirect_chain)
        .bind(a.ttfb_ms)
        .bind(a.download_ms)
        .bind(a.total_ms)
        .bind(a.bytes_downloaded)
        .bind(a.transfer_kbps)
        .bind(&a.html_sha256)
        .bind(&a.text)
        .bind(a.word_count)
        .bind(&a.language)
        .bind(&a.article_xpath)
        .bind(&a.analysis)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_article_by_url_or_canonical(
        &self,
        url: &str,
    ) -> Result<Option<ArticleRecord>, CrawlError> {
        let row = sqlx::query(
            "SELECT * FROM articles
             WHERE url = ?1 OR canonical_url = ?1
             ORDER BY (url = ?1) DESC
             LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(article_from_row))
    }

    /// Conditional-request headers for a previously stored article.
    pub async fn get_article_headers(
        &self,
        url: &str,
    ) -> Result<Option<ArticleHeaders>, CrawlError> {
        let row = sqlx::query(
            "SELECT etag, last_modified, fetched_at, crawled_at, canonical_url
             FROM articles
             WHERE url = ?1 OR canonical_url = ?1
             ORDER BY (url = ?1) DESC
             LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| ArticleHeaders {
            etag: r.get("etag"),
            last_modified: r.get("last_modified"),
            fetched_at: r.get("fetched_at"),
            crawled_at: r.get("crawled_at"),
            canonical_url: r.get("canonical_url"),
        }))
    }

    /// Record a canonical/alias relationship. Unique per (url, alias);
    /// repeats overwrite classification, reason, existence, and check time.
    pub async fn record_url_alias(
        &self,
        url: &str,
        alias: &str,
        classification: Option<&str>,
        reason: Option<&str>,
        exists: Option<bool>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO url_aliases (url, alias_url, classification, reason, target_exists, metadata, checked_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(url, alias_url) DO UPDATE SET
                 classification = excluded.classification,
                 reason         = excluded.reason,
                 target_exists  = excluded.target_exists,
                 metadata       = COALESCE(excluded.metadata, url_aliases.metadata),
                 checked_at     = excluded.checked_at",
        )
        .bind(url)
        .bind(alias)
        .bind(classification)
        .bind(reason)
        .bind(exists)
        .bind(metadata.map(|m| m.to_string()))
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Create or refresh a urls row outside the trigger paths (seeds,
    /// canonical targets observed before any fetch).
    pub async fn touch_url(
        &self,
        url: &str,
        host: Option<&str>,
        canonical_url: Option<&str>,
    ) -> Result<(), CrawlError> {
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO urls (url, host, canonical_url, created_at, last_seen_at)
             VALUES (?, ?, ?, ?4, ?4)
             ON CONFLICT(url) DO UPDATE SET
                 last_seen_at  = excluded.last_seen_at,
                 host          = COALESCE(urls.host, excluded.host),
                 canonical_url = COALESCE(excluded.canonical_url, urls.canonical_url)",
        )
        .bind(url)
        .bind(host)
        .bind(canonical_url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
