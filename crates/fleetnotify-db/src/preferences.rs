//! Preferences repository - one document per uid

use chrono::Utc;
use fleetnotify_core::{QuietHours, Result, UserPreferences};
use sqlx::sqlite::SqlitePool;
use sqlx::{Row, Sqlite, Transaction};

use crate::{db_err, parse_ts, ts};

/// Repository for user notification preferences
pub struct PreferencesRepository {
    pool: SqlitePool,
}

impl PreferencesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a user's preferences
    pub async fn upsert(&self, prefs: &UserPreferences) -> Result<()> {
        let channels_json = serde_json::to_string(&prefs.channels)?;
        let quiet_json = prefs
            .quiet_hours
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let contact_json = serde_json::to_string(&prefs.contact)?;

        sqlx::query(
            r#"
            INSERT INTO preferences (uid, channels, quiet_hours, contact, locale, timezone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                channels = excluded.channels,
                quiet_hours = excluded.quiet_hours,
                contact = excluded.contact,
                locale = excluded.locale,
                timezone = excluded.timezone,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&prefs.uid)
        .bind(&channels_json)
        .bind(&quiet_json)
        .bind(&contact_json)
        .bind(&prefs.locale)
        .bind(&prefs.timezone)
        .bind(ts(&prefs.created_at))
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Get preferences by uid
    pub async fn get(&self, uid: &str) -> Result<Option<UserPreferences>> {
        let row = sqlx::query(
            r#"
            SELECT uid, channels, quiet_hours, contact, locale, timezone, created_at, updated_at
            FROM preferences WHERE uid = ?
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_preferences).transpose()
    }
}

/// Merge a Zalo user id into a user's contact inside an open transaction,
/// creating the preferences document if the user has none yet.
pub(crate) async fn set_zalo_user_id(
    tx: &mut Transaction<'_, Sqlite>,
    uid: &str,
    zalo_user_id: &str,
) -> Result<()> {
    let now = ts(&Utc::now());
    sqlx::query(
        r#"
        INSERT INTO preferences (uid, channels, contact, created_at, updated_at)
        VALUES (?, '{}', json_object('zaloUserId', ?), ?, ?)
        ON CONFLICT(uid) DO UPDATE SET
            contact = json_set(preferences.contact, '$.zaloUserId', ?),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(uid)
    .bind(zalo_user_id)
    .bind(&now)
    .bind(&now)
    .bind(zalo_user_id)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    Ok(())
}

fn row_to_preferences(row: &sqlx::sqlite::SqliteRow) -> Result<UserPreferences> {
    let channels_json: String = row.get("channels");
    let quiet_json: Option<String> = row.get("quiet_hours");
    let contact_json: String = row.get("contact");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(UserPreferences {
        uid: row.get("uid"),
        channels: serde_json::from_str(&channels_json)?,
        quiet_hours: quiet_json
            .as_deref()
            .map(serde_json::from_str::<QuietHours>)
            .transpose()?,
        contact: serde_json::from_str(&contact_json)?,
        locale: row.get("locale"),
        timezone: row.get("timezone"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
