//! OA token repository - single current Zalo Official Account credential

use fleetnotify_core::{OaToken, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, parse_ts, ts};

/// Repository for the Zalo OA token
pub struct TokensRepository {
    pool: SqlitePool,
}

impl TokensRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Current token, if one has been stored
    pub async fn get(&self) -> Result<Option<OaToken>> {
        let row = sqlx::query("SELECT access_token, refresh_token, refreshed_at FROM oa_token WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let refreshed_at: String = row.get("refreshed_at");
                Ok(Some(OaToken {
                    access_token: row.get("access_token"),
                    refresh_token: row.get("refresh_token"),
                    refreshed_at: parse_ts(&refreshed_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Replace the stored token. Last writer wins.
    pub async fn set(&self, token: &OaToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oa_token (id, access_token, refresh_token, refreshed_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, oa_token.refresh_token),
                refreshed_at = excluded.refreshed_at
            "#,
        )
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(ts(&token.refreshed_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
