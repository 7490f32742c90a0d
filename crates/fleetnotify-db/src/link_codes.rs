//! Link codes repository - one-time codes binding a Zalo account to a uid

use chrono::{DateTime, Utc};
use fleetnotify_core::{LinkCode, LinkFailure, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, parse_opt_ts, preferences, ts};

/// Repository for link codes
pub struct LinkCodesRepository {
    pool: SqlitePool,
}

impl LinkCodesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a freshly issued code
    pub async fn insert(&self, code: &LinkCode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO link_codes (code, uid, used, expires_at_ms, zalo_user_id, used_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&code.code)
        .bind(&code.uid)
        .bind(code.used)
        .bind(code.expires_at_ms)
        .bind(&code.zalo_user_id)
        .bind(code.used_at.as_ref().map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Get a code by value
    pub async fn get(&self, code: &str) -> Result<Option<LinkCode>> {
        let row = sqlx::query(
            "SELECT code, uid, used, expires_at_ms, zalo_user_id, used_at FROM link_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_link_code).transpose()
    }

    /// Consume a code and store the Zalo user id on the owner's contact.
    ///
    /// Marking the code used and updating preferences happen in one
    /// transaction. The guarded update runs first so concurrent consumers
    /// queue on the write lock and at most one of them sees the row.
    /// Returns the owning uid, or why the code was rejected.
    pub async fn consume(
        &self,
        code: &str,
        zalo_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<String, LinkFailure>> {
        let now_ms = now.timestamp_millis();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let claimed = sqlx::query(
            r#"
            UPDATE link_codes
            SET used = 1, zalo_user_id = ?, used_at = ?
            WHERE code = ? AND used = 0 AND expires_at_ms >= ? AND uid != ''
            RETURNING uid
            "#,
        )
        .bind(zalo_user_id)
        .bind(ts(&now))
        .bind(code)
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = claimed {
            let uid: String = row.get("uid");
            preferences::set_zalo_user_id(&mut tx, &uid, zalo_user_id).await?;
            tx.commit().await.map_err(db_err)?;
            return Ok(Ok(uid));
        }

        let existing = sqlx::query(
            "SELECT code, uid, used, expires_at_ms, zalo_user_id, used_at FROM link_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.rollback().await.map_err(db_err)?;

        let failure = match existing.as_ref().map(row_to_link_code).transpose()? {
            None => LinkFailure::InvalidCode,
            Some(link) if link.is_expired(now_ms) => LinkFailure::CodeExpired,
            Some(link) if link.used => LinkFailure::CodeUsed,
            Some(_) => LinkFailure::MissingUid,
        };
        Ok(Err(failure))
    }
}

fn row_to_link_code(row: &sqlx::sqlite::SqliteRow) -> Result<LinkCode> {
    let used_at: Option<String> = row.get("used_at");
    Ok(LinkCode {
        code: row.get("code"),
        uid: row.get("uid"),
        used: row.get("used"),
        expires_at_ms: row.get("expires_at_ms"),
        zalo_user_id: row.get("zalo_user_id"),
        used_at: parse_opt_ts(used_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_db;
    use chrono::Duration;

    fn code(code: &str, uid: &str, expires_at: DateTime<Utc>) -> LinkCode {
        LinkCode {
            code: code.to_string(),
            uid: uid.to_string(),
            used: false,
            expires_at_ms: expires_at.timestamp_millis(),
            zalo_user_id: None,
            used_at: None,
        }
    }

    #[tokio::test]
    async fn test_consume_links_user() {
        let (db, _dir) = setup_db().await;
        let repo = db.link_codes();
        let now = Utc::now();
        repo.insert(&code("ABC123", "u1", now + Duration::minutes(10)))
            .await
            .unwrap();

        let uid = repo.consume("ABC123", "zalo-1", now).await.unwrap().unwrap();
        assert_eq!(uid, "u1");

        let stored = repo.get("ABC123").await.unwrap().unwrap();
        assert!(stored.used);
        assert_eq!(stored.zalo_user_id.as_deref(), Some("zalo-1"));
        assert!(stored.used_at.is_some());

        let prefs = db.preferences().get("u1").await.unwrap().unwrap();
        assert_eq!(prefs.contact.zalo_user_id.as_deref(), Some("zalo-1"));
    }

    #[tokio::test]
    async fn test_consume_twice_reports_used() {
        let (db, _dir) = setup_db().await;
        let repo = db.link_codes();
        let now = Utc::now();
        repo.insert(&code("ABC123", "u1", now + Duration::minutes(10)))
            .await
            .unwrap();

        repo.consume("ABC123", "zalo-1", now).await.unwrap().unwrap();
        let second = repo.consume("ABC123", "zalo-2", now).await.unwrap();
        assert_eq!(second, Err(LinkFailure::CodeUsed));

        let prefs = db.preferences().get("u1").await.unwrap().unwrap();
        assert_eq!(prefs.contact.zalo_user_id.as_deref(), Some("zalo-1"));
    }

    #[tokio::test]
    async fn test_concurrent_consume_exactly_once() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        db.link_codes()
            .insert(&code("RACE01", "u1", now + Duration::minutes(10)))
            .await
            .unwrap();

        let a = db.link_codes();
        let b = db.link_codes();
        let (first, second) = tokio::join!(
            a.consume("RACE01", "zalo-a", now),
            b.consume("RACE01", "zalo-b", now)
        );
        let outcomes = [first.unwrap(), second.unwrap()];

        let linked = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(linked, 1);
        assert!(outcomes.contains(&Err(LinkFailure::CodeUsed)));
    }

    #[tokio::test]
    async fn test_expired_code_reported_even_when_used() {
        let (db, _dir) = setup_db().await;
        let repo = db.link_codes();
        let now = Utc::now();

        let mut stale = code("OLD001", "u1", now - Duration::minutes(1));
        stale.used = true;
        repo.insert(&stale).await.unwrap();
        repo.insert(&code("OLD002", "u2", now - Duration::minutes(1)))
            .await
            .unwrap();

        assert_eq!(
            repo.consume("OLD001", "zalo-1", now).await.unwrap(),
            Err(LinkFailure::CodeExpired)
        );
        assert_eq!(
            repo.consume("OLD002", "zalo-1", now).await.unwrap(),
            Err(LinkFailure::CodeExpired)
        );
        assert!(db.preferences().get("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_code_and_missing_uid() {
        let (db, _dir) = setup_db().await;
        let repo = db.link_codes();
        let now = Utc::now();
        repo.insert(&code("NOUID1", "", now + Duration::minutes(10)))
            .await
            .unwrap();

        assert_eq!(
            repo.consume("NOPE00", "zalo-1", now).await.unwrap(),
            Err(LinkFailure::InvalidCode)
        );
        assert_eq!(
            repo.consume("NOUID1", "zalo-1", now).await.unwrap(),
            Err(LinkFailure::MissingUid)
        );
        assert!(!repo.get("NOUID1").await.unwrap().unwrap().used);
    }
}
