//! Templates repository

use chrono::Utc;
use fleetnotify_core::{Result, Template};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, ts};

/// Repository for notification templates
pub struct TemplatesRepository {
    pool: SqlitePool,
}

impl TemplatesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a template
    pub async fn upsert(&self, template: &Template) -> Result<()> {
        let channels_json = serde_json::to_string(&template.channels)?;
        let locales_json = serde_json::to_string(&template.locales)?;

        sqlx::query(
            r#"
            INSERT INTO templates (id, channels, locales, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                channels = excluded.channels,
                locales = excluded.locales,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&template.id)
        .bind(&channels_json)
        .bind(&locales_json)
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Get template by ID
    pub async fn get(&self, id: &str) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT id, channels, locales FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let channels_json: String = row.get("channels");
                let locales_json: String = row.get("locales");
                Ok(Some(Template {
                    id: row.get("id"),
                    channels: serde_json::from_str(&channels_json)?,
                    locales: serde_json::from_str(&locales_json)?,
                }))
            }
            None => Ok(None),
        }
    }
}
