use sqlx::Row;
use tracing::warn;

use newsreel_core::CrawlError;

use crate::rows::{DiagnosticRecord, JobRow, QueueEventRecord};
use crate::{db_err, Store};

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> JobRow {
    JobRow {
        id: row.get("id"),
        url: row.get("url"),
        args: row.get("args"),
        pid: row.get("pid"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        status: row.get("status"),
    }
}

impl Store {
    pub async fn record_crawl_job_start(
        &self,
        id: &str,
        url: Option<&str>,
        args: Option<&str>,
        pid: Option<i64>,
        started_at: &str,
        status: &str,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO crawl_jobs (id, url, args, pid, started_at, status)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 url = excluded.url,
                 args = excluded.args,
                 pid = excluded.pid,
                 started_at = excluded.started_at,
                 ended_at = NULL,
                 status = excluded.status",
        )
        .bind(id)
        .bind(url)
        .bind(args)
        .bind(pid)
        .bind(started_at)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_crawl_job_status(
        &self,
        id: &str,
        ended_at: Option<&str>,
        status: &str,
    ) -> Result<(), CrawlError> {
        sqlx::query("UPDATE crawl_jobs SET status = ?, ended_at = ? WHERE id = ?")
            .bind(status)
            .bind(ended_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_crawl_job(&self, id: &str) -> Result<Option<JobRow>, CrawlError> {
        let row = sqlx::query("SELECT * FROM crawl_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(job_from_row))
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobRow>, CrawlError> {
        let rows = sqlx::query("SELECT * FROM crawl_jobs ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Diagnostic write: failure is logged, never surfaced, so queue
    /// bookkeeping can never take a crawl down. Returns whether the row
    /// landed.
    pub async fn insert_queue_event(&self, ev: &QueueEventRecord) -> bool {
        let res = sqlx::query(
            "INSERT INTO queue_events
                 (job_id, ts, action, url, depth, host, reason, queue_size,
                  alias, queue_origin, queue_role, queue_depth_bucket)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ev.job_id)
        .bind(&ev.ts)
        .bind(&ev.action)
        .bind(&ev.url)
        .bind(ev.depth)
        .bind(&ev.host)
        .bind(&ev.reason)
        .bind(ev.queue_size)
        .bind(&ev.alias)
        .bind(&ev.queue_origin)
        .bind(&ev.queue_role)
        .bind(&ev.queue_depth_bucket)
        .execute(&self.pool)
        .await;
        if let Err(e) = res {
            warn!(job_id = %ev.job_id, action = %ev.action, "queue event dropped: {e}");
            return false;
        }
        true
    }

    pub async fn insert_problem(&self, rec: &DiagnosticRecord) -> bool {
        self.insert_diagnostic("problems", rec).await
    }

    pub async fn insert_milestone(&self, rec: &DiagnosticRecord) -> bool {
        self.insert_diagnostic("milestones", rec).await
    }

    pub async fn insert_planner_stage_event(&self, rec: &DiagnosticRecord) -> bool {
        self.insert_diagnostic("planner_stage_events", rec).await
    }

    async fn insert_diagnostic(&self, table: &str, rec: &DiagnosticRecord) -> bool {
        let sql = format!(
            "INSERT INTO {table} (job_id, kind, scope, target, message, details, ts)
             VALUES (?, ?, ?, ?, ?, ?, ?)"
        );
        let res = sqlx::query(&sql)
            .bind(&rec.job_id)
            .bind(&rec.kind)
            .bind(&rec.scope)
            .bind(&rec.target)
            .bind(&rec.message)
            .bind(&rec.details)
            .bind(&rec.ts)
            .execute(&self.pool)
            .await;
        if let Err(e) = res {
            warn!(table, job_id = %rec.job_id, kind = %rec.kind, "diagnostic dropped: {e}");
            return false;
        }
        true
    }

    pub async fn queue_events_for_job(
        &self,
        job_id: &str,
    ) -> Result<Vec<QueueEventRecord>, CrawlError> {
        let rows = sqlx::query("SELECT * FROM queue_events WHERE job_id = ? ORDER BY id")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|row| QueueEventRecord {
                job_id: row.get("job_id"),
                ts: row.get("ts"),
                action: row.get("action"),
                url: row.get("url"),
                depth: row.get("depth"),
                host: row.get("host"),
                reason: row.get("reason"),
                queue_size: row.get("queue_size"),
                alias: row.get("alias"),
                queue_origin: row.get("queue_origin"),
                queue_role: row.get("queue_role"),
                queue_depth_bucket: row.get("queue_depth_bucket"),
            })
            .collect())
    }
}
