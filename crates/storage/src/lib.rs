use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use newsreel_core::CrawlError;

mod articles;
mod fetches;
mod jobs;
mod reads;
pub mod rows;
mod tasks;

pub use reads::ArticleUrlStream;
pub use rows::*;

/// Columns added after the base schema shipped. Applied additively on
/// open; an older database gains them, a current one is untouched.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("urls", "analysis", "TEXT"),
    ("fetches", "content_encoding", "TEXT"),
    ("articles", "language", "TEXT"),
    ("articles", "article_xpath", "TEXT"),
    ("articles", "analysis", "TEXT"),
    ("task_events", "item_count", "INTEGER"),
];

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub readonly: bool,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            readonly: false,
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the SQLite pool, the schema, and every prepared query. One
/// writable handle per process; read-only handles may be opened separately
/// for tools and never run migrations.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

pub(crate) fn db_err(e: sqlx::Error) -> CrawlError {
    CrawlError::Storage(e.to_string())
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Store {
    /// Open or create the store at `path`. Readonly handles skip all
    /// schema work; writable handles get WAL, foreign keys, a bounded busy
    /// timeout, and idempotent schema/trigger/backfill setup.
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, CrawlError> {
        let connect = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(!options.readonly)
            .read_only(options.readonly)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        if !options.readonly {
            store.setup_schema().await?;
        }
        info!(path = %path.as_ref().display(), readonly = options.readonly, "store open");
        Ok(store)
    }

    /// In-memory store for tests. Single connection: each SQLite `:memory:`
    /// connection is its own database.
    pub async fn open_memory() -> Result<Self, CrawlError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.setup_schema().await?;
        Ok(store)
    }

    async fn setup_schema(&self) -> Result<(), CrawlError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        for (table, column, decl) in ADDITIVE_COLUMNS {
            self.ensure_column(table, column, decl).await?;
        }

        sqlx::raw_sql(include_str!("../migrations/002_triggers.sql"))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        self.backfill_derived().await?;
        debug!("schema ready");
        Ok(())
    }

    async fn ensure_column(&self, table: &str, column: &str, decl: &str) -> Result<(), CrawlError> {
        let present: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if present == 0 {
            let ddl = format!("ALTER TABLE {table} ADD COLUMN {column} {decl}");
            sqlx::query(&ddl).execute(&self.pool).await.map_err(db_err)?;
            info!(table, column, "added column");
        }
        Ok(())
    }

    /// Populate urls and latest_fetch from rows that predate the triggers.
    /// Guarded so a fresh or already-upgraded database is a no-op.
    async fn backfill_derived(&self) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO urls (url, host, created_at, last_seen_at)
             SELECT f.url, MAX(f.host),
                    MIN(COALESCE(f.fetched_at, f.request_started_at)),
                    MAX(COALESCE(f.fetched_at, f.request_started_at))
             FROM fetches f
             WHERE NOT EXISTS (SELECT 1 FROM urls u WHERE u.url = f.url)
             GROUP BY f.url",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO urls (url, host, canonical_url, created_at, last_seen_at)
             SELECT a.url, a.host, a.canonical_url,
                    COALESCE(a.crawled_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    COALESCE(a.crawled_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             FROM articles a
             WHERE NOT EXISTS (SELECT 1 FROM urls u WHERE u.url = a.url)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO latest_fetch (url, ts, http_status, classification, word_count)
             SELECT f.url, COALESCE(f.fetched_at, f.request_started_at),
                    f.http_status, f.classification, f.word_count
             FROM fetches f
             JOIN (SELECT url, MAX(COALESCE(fetched_at, request_started_at)) AS mts
                   FROM fetches GROUP BY url) m
               ON m.url = f.url AND COALESCE(f.fetched_at, f.request_started_at) = m.mts
             WHERE NOT EXISTS (SELECT 1 FROM latest_fetch lf WHERE lf.url = f.url)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn check_connectivity(&self) -> Result<(), CrawlError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Existence check across urls, fetches, and articles.
    pub async fn has_url(&self, url: &str) -> Result<bool, CrawlError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM urls WHERE url = ?1)
                 OR EXISTS (SELECT 1 FROM fetches WHERE url = ?1)
                 OR EXISTS (SELECT 1 FROM articles WHERE url = ?1) AS present",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let present: i64 = row.get("present");
        Ok(present != 0)
    }
}
