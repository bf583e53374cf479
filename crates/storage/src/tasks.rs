use sqlx::Row;

use newsreel_core::CrawlError;

use crate::rows::CrawlTaskRow;
use crate::{db_err, now_rfc3339, Store};

/// Default and floor for the per-job task queue cap.
const TASK_CAP_DEFAULT: i64 = 100;
const TASK_CAP_FLOOR: i64 = 10;

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> CrawlTaskRow {
    CrawlTaskRow {
        id: row.get("id"),
        job_id: row.get("job_id"),
        kind: row.get("kind"),
        payload: row.get("payload"),
        status: row.get("status"),
        note: row.get("note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl Store {
    /// Enqueue a task for a job. The per-job queue is capped; overflow
    /// prunes the oldest non-terminal tasks in the same transaction as the
    /// insert, so the cap holds under concurrent writers.
    pub async fn create_task(
        &self,
        job_id: &str,
        kind: &str,
        payload: Option<&serde_json::Value>,
        cap: Option<i64>,
    ) -> Result<i64, CrawlError> {
        let cap = cap.unwrap_or(TASK_CAP_DEFAULT).max(TASK_CAP_FLOOR);
        let now = now_rfc3339();

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let res = sqlx::query(
            "INSERT INTO crawl_tasks (job_id, kind, payload, status, created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?4, ?4)",
        )
        .bind(job_id)
        .bind(kind)
        .bind(payload.map(|p| p.to_string()))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let id = res.last_insert_rowid();

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crawl_tasks
             WHERE job_id = ? AND status NOT IN ('done', 'failed', 'cancelled')",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if open > cap {
            sqlx::query(
                "DELETE FROM crawl_tasks WHERE id IN (
                     SELECT id FROM crawl_tasks
                     WHERE job_id = ? AND status NOT IN ('done', 'failed', 'cancelled')
                     ORDER BY id ASC LIMIT ?
                 )",
            )
            .bind(job_id)
            .bind(open - cap)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(id)
    }

    pub async fn get_task_by_id(&self, id: i64) -> Result<Option<CrawlTaskRow>, CrawlError> {
        let row = sqlx::query("SELECT * FROM crawl_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(task_from_row))
    }

    pub async fn list_tasks(
        &self,
        job_id: Option<&str>,
        statuses: &[&str],
        limit: i64,
    ) -> Result<Vec<CrawlTaskRow>, CrawlError> {
        let mut sql = String::from("SELECT * FROM crawl_tasks WHERE 1 = 1");
        if job_id.is_some() {
            sql.push_str(" AND job_id = ?");
        }
        if !statuses.is_empty() {
            let marks = vec!["?"; statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({marks})"));
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(job) = job_id {
            query = query.bind(job);
        }
        for status in statuses {
            query = query.bind(*status);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    pub async fn update_task_status(
        &self,
        id: i64,
        status: &str,
        note: Option<&str>,
    ) -> Result<bool, CrawlError> {
        let res = sqlx::query(
            "UPDATE crawl_tasks SET status = ?, note = COALESCE(?, note), updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(note)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    /// Remove a job's tasks; all of them, or only those in the given
    /// statuses.
    pub async fn clear_tasks_for_job(
        &self,
        job_id: &str,
        statuses: Option<&[&str]>,
    ) -> Result<u64, CrawlError> {
        let res = match statuses {
            None => sqlx::query("DELETE FROM crawl_tasks WHERE job_id = ?")
                .bind(job_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?,
            Some(statuses) => {
                let marks = vec!["?"; statuses.len()].join(", ");
                let sql =
                    format!("DELETE FROM crawl_tasks WHERE job_id = ? AND status IN ({marks})");
                let mut query = sqlx::query(&sql).bind(job_id);
                for status in statuses {
                    query = query.bind(*status);
                }
                query.execute(&self.pool).await.map_err(db_err)?
            }
        };
        Ok(res.rows_affected())
    }
}
