//! Jobs repository - notification job lifecycle

use chrono::{DateTime, Utc};
use fleetnotify_core::{Channel, JobStatus, NotificationJob, Priority, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, parse_opt_ts, parse_ts, ts};

const JOB_COLUMNS: &str = "id, uid, required_channels, title, body, action_url, topic, template_id, \
     data, locale, priority, scheduled_at, attempts, last_error, status, created_at, updated_at";

/// Repository for job operations
pub struct JobsRepository {
    pool: SqlitePool,
}

impl JobsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new job
    pub async fn insert(&self, job: &NotificationJob) -> Result<()> {
        let channels_json = serde_json::to_string(&job.required_channels)?;
        let data_json = serde_json::to_string(&job.data)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, uid, required_channels, title, body, action_url, topic, template_id,
                data, locale, priority, scheduled_at, attempts, last_error, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.uid)
        .bind(&channels_json)
        .bind(&job.title)
        .bind(&job.body)
        .bind(&job.action_url)
        .bind(&job.topic)
        .bind(&job.template_id)
        .bind(&data_json)
        .bind(&job.locale)
        .bind(job.priority.as_str())
        .bind(job.scheduled_at.as_ref().map(ts))
        .bind(job.attempts as i64)
        .bind(&job.last_error)
        .bind(job.status.as_str())
        .bind(ts(&job.created_at))
        .bind(ts(&job.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Get job by ID
    pub async fn get(&self, id: &str) -> Result<Option<NotificationJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(row_to_job).transpose()
    }

    /// Atomically mark due, untriggered jobs as triggered and return them.
    /// Each job is returned by exactly one call.
    pub async fn claim_untriggered(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<NotificationJob>> {
        let now = ts(&now);
        let rows = sqlx::query(&format!(
            r#"
            UPDATE jobs SET triggered_at = ?
            WHERE id IN (
                SELECT id FROM jobs
                WHERE triggered_at IS NULL
                  AND (scheduled_at IS NULL OR scheduled_at <= ?)
                ORDER BY created_at
                LIMIT ?
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(&now)
        .bind(&now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut jobs = rows.iter().map(row_to_job).collect::<Result<Vec<_>>>()?;
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    /// Move a job forward in its lifecycle. Returns false when the job is
    /// missing or already at or past `status`.
    pub async fn advance_status(&self, id: &str, status: JobStatus, last_error: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?,
                last_error = COALESCE(?, last_error),
                updated_at = ?
            WHERE id = ?
              AND (CASE status WHEN 'pending' THEN 0 WHEN 'processing' THEN 1 ELSE 2 END) < ?
            "#,
        )
        .bind(status.as_str())
        .bind(last_error)
        .bind(ts(&Utc::now()))
        .bind(id)
        .bind(status.rank() as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    /// Increment the attempt counter
    pub async fn increment_attempts(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET attempts = attempts + 1, updated_at = ? WHERE id = ?")
            .bind(ts(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    /// Most recent jobs first
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<NotificationJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_job).collect()
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<NotificationJob> {
    let channels_json: String = row.get("required_channels");
    let data_json: String = row.get("data");
    let priority_str: String = row.get("priority");
    let status_str: String = row.get("status");
    let attempts: i64 = row.get("attempts");
    let scheduled_at: Option<String> = row.get("scheduled_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let required_channels: Vec<Channel> = serde_json::from_str(&channels_json)?;
    let priority: Priority = priority_str.parse()?;
    let status: JobStatus = status_str.parse()?;

    Ok(NotificationJob {
        id: row.get("id"),
        uid: row.get("uid"),
        required_channels,
        title: row.get("title"),
        body: row.get("body"),
        action_url: row.get("action_url"),
        topic: row.get("topic"),
        template_id: row.get("template_id"),
        data: serde_json::from_str(&data_json)?,
        locale: row.get("locale"),
        priority,
        scheduled_at: parse_opt_ts(scheduled_at)?,
        attempts: attempts as u32,
        last_error: row.get("last_error"),
        status,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
