//! Deliveries repository - idempotent per (job, channel, recipient) bookkeeping
//!
//! Every write is an upsert on the deterministic delivery id. Repeated writes
//! for the same id merge into one row: `meta` is JSON-patched, the attempt
//! counter only grows, and `sent_at` keeps its last non-null value.

use chrono::Utc;
use fleetnotify_core::{Channel, Delivery, DeliveryStatus, ProviderResult, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, parse_opt_ts, parse_ts, ts};

const DELIVERY_COLUMNS: &str = "id, job_id, uid, channel, provider, status, provider_message_id, \
     error_code, error_message, attempts, created_at, sent_at, delivered_at, read_at, meta";

/// Identity of a delivery record plus the outcome to merge into it
#[derive(Debug, Clone)]
pub struct DeliveryWrite<'a> {
    pub id: &'a str,
    pub job_id: &'a str,
    pub uid: Option<&'a str>,
    pub channel: Channel,
    pub result: &'a ProviderResult,
}

/// Repository for delivery records
pub struct DeliveriesRepository {
    pool: SqlitePool,
}

impl DeliveriesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Merge the outcome of one provider attempt and bump the attempt counter
    pub async fn record_attempt(&self, write: &DeliveryWrite<'_>) -> Result<Delivery> {
        self.upsert(write, true).await
    }

    /// Merge an outcome decided without calling a provider (e.g. opted out)
    pub async fn record_outcome(&self, write: &DeliveryWrite<'_>) -> Result<Delivery> {
        self.upsert(write, false).await
    }

    async fn upsert(&self, write: &DeliveryWrite<'_>, count_attempt: bool) -> Result<Delivery> {
        let result = write.result;
        let now = ts(&Utc::now());
        let sent_at = (!result.is_failed()
            && !matches!(result.status, DeliveryStatus::Skipped))
        .then(|| now.clone());
        let meta = if result.meta.is_object() {
            serde_json::to_string(&result.meta)?
        } else {
            "{}".to_string()
        };
        let increment: i64 = if count_attempt { 1 } else { 0 };

        sqlx::query(
            r#"
            INSERT INTO deliveries (
                id, job_id, uid, channel, provider, status, provider_message_id,
                error_code, error_message, attempts, created_at, sent_at, meta
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                status = excluded.status,
                provider_message_id = COALESCE(excluded.provider_message_id, deliveries.provider_message_id),
                error_code = excluded.error_code,
                error_message = excluded.error_message,
                attempts = deliveries.attempts + ?,
                sent_at = COALESCE(excluded.sent_at, deliveries.sent_at),
                meta = json_patch(deliveries.meta, excluded.meta)
            "#,
        )
        .bind(write.id)
        .bind(write.job_id)
        .bind(write.uid)
        .bind(write.channel.as_str())
        .bind(&result.provider)
        .bind(result.status.as_str())
        .bind(&result.provider_message_id)
        .bind(&result.error_code)
        .bind(&result.error_message)
        .bind(increment)
        .bind(&now)
        .bind(&sent_at)
        .bind(&meta)
        .bind(increment)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.require(write.id).await
    }

    /// Record a quiet-hours deferral. Never downgrades a record that already
    /// moved past `queued`/`pending`, and does not count as an attempt.
    pub async fn mark_deferred(
        &self,
        id: &str,
        job_id: &str,
        uid: Option<&str>,
        channel: Channel,
    ) -> Result<Delivery> {
        sqlx::query(
            r#"
            INSERT INTO deliveries (id, job_id, uid, channel, provider, status, attempts, created_at, meta)
            VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, json_object('deferredBy', 'quiet_hours'))
            ON CONFLICT(id) DO UPDATE SET
                status = CASE WHEN deliveries.status IN ('queued', 'pending')
                              THEN 'pending' ELSE deliveries.status END,
                meta = json_patch(deliveries.meta, excluded.meta)
            "#,
        )
        .bind(id)
        .bind(job_id)
        .bind(uid)
        .bind(channel.as_str())
        .bind(channel.as_str())
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.require(id).await
    }

    /// Get delivery by ID
    pub async fn get(&self, id: &str) -> Result<Option<Delivery>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM deliveries WHERE id = ?",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_delivery).transpose()
    }

    /// All deliveries of a job
    pub async fn list_by_job(&self, job_id: &str) -> Result<Vec<Delivery>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deliveries WHERE job_id = ? ORDER BY created_at, id",
            DELIVERY_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_delivery).collect()
    }

    async fn require(&self, id: &str) -> Result<Delivery> {
        self.get(id)
            .await?
            .ok_or_else(|| fleetnotify_core::Error::db(format!("delivery {} vanished after write", id)))
    }
}

fn row_to_delivery(row: &sqlx::sqlite::SqliteRow) -> Result<Delivery> {
    let channel_str: String = row.get("channel");
    let status_str: String = row.get("status");
    let attempts: i64 = row.get("attempts");
    let created_at: String = row.get("created_at");
    let meta_json: String = row.get("meta");

    Ok(Delivery {
        id: row.get("id"),
        job_id: row.get("job_id"),
        uid: row.get("uid"),
        channel: channel_str.parse()?,
        provider: row.get("provider"),
        status: status_str.parse()?,
        provider_message_id: row.get("provider_message_id"),
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        attempts: attempts as u32,
        created_at: parse_ts(&created_at)?,
        sent_at: parse_opt_ts(row.get("sent_at"))?,
        delivered_at: parse_opt_ts(row.get("delivered_at"))?,
        read_at: parse_opt_ts(row.get("read_at"))?,
        meta: serde_json::from_str(&meta_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_db;
    use fleetnotify_core::{delivery_id, recipient_key};
    use serde_json::json;

    fn write<'a>(id: &'a str, result: &'a ProviderResult) -> DeliveryWrite<'a> {
        DeliveryWrite {
            id,
            job_id: "job1",
            uid: Some("u1"),
            channel: Channel::Push,
            result,
        }
    }

    #[tokio::test]
    async fn test_repeated_attempts_merge_into_one_record() {
        let (db, _dir) = setup_db().await;
        let deliveries = db.deliveries();
        let id = delivery_id("job1", Channel::Push, &recipient_key(Some("u1"), None));

        let failed = ProviderResult::failed("fcm", "UNAVAILABLE", "503 from FCM");
        let sent = ProviderResult::sent("fcm", Some("projects/p/messages/1".to_string()))
            .with_meta(json!({ "successCount": 1 }));

        deliveries.record_attempt(&write(&id, &failed)).await.unwrap();
        deliveries.record_attempt(&write(&id, &failed)).await.unwrap();
        let last = deliveries.record_attempt(&write(&id, &sent)).await.unwrap();

        assert_eq!(last.attempts, 3);
        assert_eq!(last.status, DeliveryStatus::Sent);
        assert!(last.sent_at.is_some());
        assert!(last.error_code.is_none());
        assert_eq!(last.meta["successCount"], 1);

        let all = deliveries.list_by_job("job1").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_does_not_set_sent_at() {
        let (db, _dir) = setup_db().await;
        let deliveries = db.deliveries();
        let failed = ProviderResult::failed("zalo", "NO_TOKEN", "no OA token");

        let stored = deliveries.record_attempt(&write("d1", &failed)).await.unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert!(stored.sent_at.is_none());
        assert_eq!(stored.error_code.as_deref(), Some("NO_TOKEN"));
    }

    #[tokio::test]
    async fn test_later_failure_keeps_message_id_and_sent_at() {
        let (db, _dir) = setup_db().await;
        let deliveries = db.deliveries();
        let sent = ProviderResult::sent("fcm", Some("m1".to_string()));
        let failed = ProviderResult::failed("fcm", "UNAVAILABLE", "503");

        deliveries.record_attempt(&write("d1", &sent)).await.unwrap();
        let stored = deliveries.record_attempt(&write("d1", &failed)).await.unwrap();

        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.provider_message_id.as_deref(), Some("m1"));
        assert!(stored.sent_at.is_some());
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn test_meta_is_merged() {
        let (db, _dir) = setup_db().await;
        let deliveries = db.deliveries();
        let first = ProviderResult::sent("fcm", None).with_meta(json!({ "a": 1 }));
        let second = ProviderResult::sent("fcm", None).with_meta(json!({ "b": 2 }));

        deliveries.record_attempt(&write("d1", &first)).await.unwrap();
        let stored = deliveries.record_attempt(&write("d1", &second)).await.unwrap();
        assert_eq!(stored.meta, json!({ "a": 1, "b": 2 }));
    }

    #[tokio::test]
    async fn test_outcome_without_attempt() {
        let (db, _dir) = setup_db().await;
        let deliveries = db.deliveries();
        let skipped = ProviderResult::skipped("email", "OPTED_OUT", "user disabled email");

        let stored = deliveries.record_outcome(&write("d1", &skipped)).await.unwrap();
        assert_eq!(stored.status, DeliveryStatus::Skipped);
        assert_eq!(stored.attempts, 0);
        assert!(stored.sent_at.is_none());
    }

    #[tokio::test]
    async fn test_deferred_never_downgrades() {
        let (db, _dir) = setup_db().await;
        let deliveries = db.deliveries();

        let pending = deliveries
            .mark_deferred("d1", "job1", Some("u1"), Channel::Sms)
            .await
            .unwrap();
        assert_eq!(pending.status, DeliveryStatus::Pending);
        assert_eq!(pending.attempts, 0);
        assert_eq!(pending.meta["deferredBy"], "quiet_hours");

        let sent = ProviderResult::sent("sms", Some("s1".to_string()));
        let w = DeliveryWrite {
            channel: Channel::Sms,
            ..write("d1", &sent)
        };
        deliveries.record_attempt(&w).await.unwrap();

        let again = deliveries
            .mark_deferred("d1", "job1", Some("u1"), Channel::Sms)
            .await
            .unwrap();
        assert_eq!(again.status, DeliveryStatus::Sent);
        assert_eq!(again.attempts, 1);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_are_all_counted() {
        let (db, _dir) = setup_db().await;
        let sent = ProviderResult::sent("fcm", None);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let db = db.clone();
            let sent = sent.clone();
            handles.push(tokio::spawn(async move {
                db.deliveries()
                    .record_attempt(&DeliveryWrite {
                        id: "d1",
                        job_id: "job1",
                        uid: Some("u1"),
                        channel: Channel::Push,
                        result: &sent,
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = db.deliveries().get("d1").await.unwrap().unwrap();
        assert_eq!(stored.attempts, 5);
    }
}
