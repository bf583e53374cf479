use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use newsreel_core::config::EventWriterConfig;
use newsreel_core::events::CrawlEvent;

use crate::infer::infer;

/// One event handed to the writer. Only `task_type`, `task_id`, and
/// `event_type` are required; everything else is inferred or extracted.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    pub task_type: String,
    pub task_id: String,
    pub event_type: String,
    pub data: Option<Value>,
    pub scope: Option<String>,
    pub target: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct PendingRow {
    task_type: String,
    task_id: String,
    seq: i64,
    ts: String,
    event_type: String,
    event_category: String,
    severity: String,
    scope: Option<String>,
    target: Option<String>,
    payload: Option<String>,
    duration_ms: Option<i64>,
    http_status: Option<i64>,
    item_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TaskEventRow {
    pub task_type: String,
    pub task_id: String,
    pub seq: i64,
    pub ts: String,
    pub event_type: String,
    pub event_category: String,
    pub severity: String,
    pub scope: Option<String>,
    pub target: Option<String>,
    pub payload: Option<String>,
    pub duration_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub item_count: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilters {
    pub category: Option<String>,
    pub severity: Option<String>,
    pub event_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub task_id: String,
    pub total: i64,
    pub errors: i64,
    pub warnings: i64,
    pub first_ts: Option<String>,
    pub last_ts: Option<String>,
    pub max_seq: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TaskListEntry {
    pub task_type: String,
    pub task_id: String,
    pub events: i64,
    pub last_ts: Option<String>,
}

#[derive(Default)]
struct WriterState {
    buffer: Vec<PendingRow>,
    next_seq: HashMap<String, i64>,
}

/// Sole writer of `task_events`. Buffers rows, assigns a strictly
/// increasing `seq` per task, and flushes batches in one transaction. A
/// failed flush is logged and dropped; producers are never blocked or
/// broken by telemetry.
pub struct EventWriter {
    pool: SqlitePool,
    cfg: EventWriterConfig,
    state: Arc<Mutex<WriterState>>,
    flusher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn first_i64(data: Option<&Value>, keys: &[&str]) -> Option<i64> {
    let data = data?;
    for key in keys {
        if let Some(v) = data.get(key) {
            if let Some(n) = v.as_i64() {
                return Some(n);
            }
            if let Some(f) = v.as_f64() {
                return Some(f as i64);
            }
        }
    }
    None
}

fn first_str<'a>(data: Option<&'a Value>, keys: &[&str]) -> Option<&'a str> {
    let data = data?;
    keys.iter().find_map(|key| data.get(*key).and_then(Value::as_str))
}

fn infer_scope(explicit: Option<String>, data: Option<&Value>) -> Option<String> {
    if explicit.is_some() {
        return explicit;
    }
    if let Some(host) = first_str(data, &["host", "domain"]) {
        return Some(format!("domain:{host}"));
    }
    if let Some(stage) = first_str(data, &["stage"]) {
        return Some(format!("stage:{stage}"));
    }
    if let Some(url) = first_str(data, &["url"]) {
        if let Some(host) = newsreel_core::urlnorm::host_of(url) {
            return Some(format!("domain:{host}"));
        }
    }
    None
}

impl EventWriter {
    pub fn new(pool: SqlitePool, cfg: EventWriterConfig) -> Arc<Self> {
        let writer = Arc::new(Self {
            pool,
            cfg: cfg.clone(),
            state: Arc::new(Mutex::new(WriterState::default())),
            flusher: std::sync::Mutex::new(None),
        });

        if cfg.batch_writes && cfg.flush_interval_ms > 0 {
            let periodic = Arc::clone(&writer);
            let handle = tokio::spawn(async move {
                let mut tick = tokio::time::interval(std::time::Duration::from_millis(
                    periodic.cfg.flush_interval_ms,
                ));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    periodic.flush().await;
                }
            });
            *writer.flusher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        }

        writer
    }

    /// Record one event. Missing identity fields mean a silent skip.
    pub async fn write(&self, req: WriteRequest) {
        if req.task_type.is_empty() || req.task_id.is_empty() || req.event_type.is_empty() {
            debug!(event_type = %req.event_type, "event skipped: incomplete identity");
            return;
        }

        let (inferred_category, inferred_severity) = infer(&req.event_type);
        let event_category = req.category.unwrap_or_else(|| inferred_category.to_string());
        let severity = req.severity.unwrap_or_else(|| inferred_severity.to_string());
        let ts = req.ts.unwrap_or_else(Utc::now).to_rfc3339();

        let duration_ms = first_i64(req.data.as_ref(), &["durationMs", "duration_ms", "ms"]);
        let http_status = first_i64(req.data.as_ref(), &["httpStatus", "http_status", "status"]);
        let item_count = first_i64(req.data.as_ref(), &["count", "linksFound", "visited", "queued"]);
        let scope = infer_scope(req.scope, req.data.as_ref());
        let target = req.target.or_else(|| {
            first_str(req.data.as_ref(), &["url", "pattern"]).map(str::to_string)
        });
        let payload = req.data.as_ref().map(Value::to_string);

        let flush_now;
        {
            let mut state = self.state.lock().await;
            let seq = match state.next_seq.get(&req.task_id) {
                Some(next) => *next,
                None => {
                    let max: Option<i64> = sqlx::query_scalar(
                        "SELECT MAX(seq) FROM task_events WHERE task_id = ?",
                    )
                    .bind(&req.task_id)
                    .fetch_one(&self.pool)
                    .await
                    .ok()
                    .flatten();
                    max.unwrap_or(0) + 1
                }
            };
            state.next_seq.insert(req.task_id.clone(), seq + 1);
            state.buffer.push(PendingRow {
                task_type: req.task_type,
                task_id: req.task_id,
                seq,
                ts,
                event_type: req.event_type,
                event_category,
                severity,
                scope,
                target,
                payload,
                duration_ms,
                http_status,
                item_count,
            });
            flush_now = !self.cfg.batch_writes || state.buffer.len() >= self.cfg.batch_size;
        }
        if flush_now {
            self.flush().await;
        }
    }

    /// Typed entry point for in-process producers emitting `CrawlEvent`s.
    pub async fn write_event(&self, event: &CrawlEvent) {
        self.write(WriteRequest {
            task_type: "crawl".to_string(),
            task_id: event.job_id.clone(),
            event_type: event.payload.event_type().to_string(),
            data: Some(event.payload.data()),
            target: event.payload.target().map(str::to_string),
            ts: Some(event.ts),
            ..Default::default()
        })
        .await;
    }

    /// Adapter for bridge-shaped events (`jobId`, `crawlType`, `type`,
    /// `data`, `timestamp`, `severity`). Events without a resolvable job id
    /// are dropped.
    pub async fn write_telemetry_event(&self, event: &Value) {
        let Some(job_id) = first_str(Some(event), &["jobId", "job_id"]) else {
            debug!("telemetry event dropped: no job id");
            return;
        };
        let task_type = first_str(Some(event), &["crawlType", "taskType"]).unwrap_or("crawl");
        let Some(event_type) = first_str(Some(event), &["type", "event"]) else {
            return;
        };
        let ts = first_str(Some(event), &["timestamp", "ts"])
            .and_then(|t| t.parse::<DateTime<Utc>>().ok());
        self.write(WriteRequest {
            task_type: task_type.to_string(),
            task_id: job_id.to_string(),
            event_type: event_type.to_string(),
            data: event.get("data").cloned(),
            severity: first_str(Some(event), &["severity"]).map(str::to_string),
            ts,
            ..Default::default()
        })
        .await;
    }

    /// Adapter for background-task telemetry shapes.
    pub async fn write_background_task_event(&self, entry: &Value) {
        let Some(task_id) = first_str(Some(entry), &["taskId", "task_id", "task"]) else {
            debug!("background task event dropped: no task id");
            return;
        };
        let Some(event_type) = first_str(Some(entry), &["event", "type"]) else {
            return;
        };
        self.write(WriteRequest {
            task_type: first_str(Some(entry), &["taskType", "task_type"])
                .unwrap_or("background")
                .to_string(),
            task_id: task_id.to_string(),
            event_type: event_type.to_string(),
            data: entry.get("data").cloned(),
            ..Default::default()
        })
        .await;
    }

    /// Drain the buffer in a single transaction. Failures drop the batch.
    pub async fn flush(&self) {
        let rows = {
            let mut state = self.state.lock().await;
            if state.buffer.is_empty() {
                return;
            }
            std::mem::take(&mut state.buffer)
        };
        if let Err(e) = self.insert_batch(&rows).await {
            warn!(dropped = rows.len(), "task event batch dropped: {e}");
        }
    }

    async fn insert_batch(&self, rows: &[PendingRow]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO task_events
                     (task_type, task_id, seq, ts, event_type, event_category,
                      severity, scope, target, payload, duration_ms, http_status, item_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.task_type)
            .bind(&row.task_id)
            .bind(row.seq)
            .bind(&row.ts)
            .bind(&row.event_type)
            .bind(&row.event_category)
            .bind(&row.severity)
            .bind(&row.scope)
            .bind(&row.target)
            .bind(&row.payload)
            .bind(row.duration_ms)
            .bind(row.http_status)
            .bind(row.item_count)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    /// Stop the periodic flush and write out whatever is buffered.
    pub async fn destroy(&self) {
        let handle = self
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.flush().await;
    }

    // --- queries ---

    pub async fn get_events(
        &self,
        task_id: &str,
        filters: &EventFilters,
        since_seq: Option<i64>,
        limit: i64,
    ) -> Result<Vec<TaskEventRow>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM task_events WHERE task_id = ?");
        if filters.category.is_some() {
            sql.push_str(" AND event_category = ?");
        }
        if filters.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }
        if filters.event_type.is_some() {
            sql.push_str(" AND event_type = ?");
        }
        if since_seq.is_some() {
            sql.push_str(" AND seq > ?");
        }
        sql.push_str(" ORDER BY seq LIMIT ?");

        let mut query = sqlx::query(&sql).bind(task_id);
        if let Some(category) = &filters.category {
            query = query.bind(category);
        }
        if let Some(severity) = &filters.severity {
            query = query.bind(severity);
        }
        if let Some(event_type) = &filters.event_type {
            query = query.bind(event_type);
        }
        if let Some(seq) = since_seq {
            query = query.bind(seq);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    pub async fn get_summary(&self, task_id: &str) -> Result<TaskSummary, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    SUM(severity = 'error') AS errors,
                    SUM(severity = 'warn') AS warnings,
                    MIN(ts) AS first_ts,
                    MAX(ts) AS last_ts,
                    MAX(seq) AS max_seq
             FROM task_events WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(TaskSummary {
            task_id: task_id.to_string(),
            total: row.get("total"),
            errors: row.get::<Option<i64>, _>("errors").unwrap_or(0),
            warnings: row.get::<Option<i64>, _>("warnings").unwrap_or(0),
            first_ts: row.get("first_ts"),
            last_ts: row.get("last_ts"),
            max_seq: row.get("max_seq"),
        })
    }

    pub async fn get_problems(
        &self,
        task_id: &str,
        limit: i64,
    ) -> Result<Vec<TaskEventRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM task_events
             WHERE task_id = ? AND severity IN ('warn', 'error')
             ORDER BY seq LIMIT ?",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    /// Lifecycle and control events only, in order.
    pub async fn get_timeline(&self, task_id: &str) -> Result<Vec<TaskEventRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM task_events
             WHERE task_id = ? AND event_category IN ('lifecycle', 'control')
             ORDER BY seq",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    pub async fn list_tasks(
        &self,
        task_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TaskListEntry>, sqlx::Error> {
        let mut sql = String::from(
            "SELECT task_type, task_id, COUNT(*) AS events, MAX(ts) AS last_ts FROM task_events",
        );
        if task_type.is_some() {
            sql.push_str(" WHERE task_type = ?");
        }
        sql.push_str(" GROUP BY task_type, task_id ORDER BY last_ts DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(tt) = task_type {
            query = query.bind(tt);
        }
        query = query.bind(limit);
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| TaskListEntry {
                task_type: row.get("task_type"),
                task_id: row.get("task_id"),
                events: row.get("events"),
                last_ts: row.get("last_ts"),
            })
            .collect())
    }

    // --- retention ---

    pub async fn prune_older_than(&self, days: i64) -> Result<u64, sqlx::Error> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let res = sqlx::query("DELETE FROM task_events WHERE ts < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<u64, sqlx::Error> {
        let res = sqlx::query("DELETE FROM task_events WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        self.state.lock().await.next_seq.remove(task_id);
        Ok(res.rows_affected())
    }

    /// Drop all events of tasks that reached `crawl:end` before the cutoff.
    pub async fn prune_completed_tasks(&self, days: i64) -> Result<u64, sqlx::Error> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let res = sqlx::query(
            "DELETE FROM task_events WHERE task_id IN (
                 SELECT task_id FROM task_events
                 GROUP BY task_id
                 HAVING MAX(ts) < ? AND SUM(event_type = 'crawl:end') > 0
             )",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> TaskEventRow {
    TaskEventRow {
        task_type: row.get("task_type"),
        task_id: row.get("task_id"),
        seq: row.get("seq"),
        ts: row.get("ts"),
        event_type: row.get("event_type"),
        event_category: row.get("event_category"),
        severity: row.get("severity"),
        scope: row.get("scope"),
        target: row.get("target"),
        payload: row.get("payload"),
        duration_ms: row.get("duration_ms"),
        http_status: row.get("http_status"),
        item_count: row.get("item_count"),
    }
}
