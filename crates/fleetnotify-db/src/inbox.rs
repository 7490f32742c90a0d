//! Inbox repository - in-app notifications

use fleetnotify_core::{InboxItem, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, parse_ts, ts};

pub struct InboxRepository {
    pool: SqlitePool,
}

impl InboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, item: &InboxItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inbox (id, uid, job_id, title, body, action_url, read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.uid)
        .bind(&item.job_id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.action_url)
        .bind(item.read)
        .bind(ts(&item.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Newest first
    pub async fn list_for_user(&self, uid: &str, limit: i64) -> Result<Vec<InboxItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, uid, job_id, title, body, action_url, read, created_at
            FROM inbox WHERE uid = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(uid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Ok(InboxItem {
                    id: row.get("id"),
                    uid: row.get("uid"),
                    job_id: row.get("job_id"),
                    title: row.get("title"),
                    body: row.get("body"),
                    action_url: row.get("action_url"),
                    read: row.get("read"),
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }
}
