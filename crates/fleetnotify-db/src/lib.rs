//! fleetnotify database - SQLite persistence layer

pub mod deliveries;
pub mod inbox;
pub mod jobs;
pub mod link_codes;
pub mod preferences;
pub mod schema;
pub mod templates;
pub mod tokens;

use chrono::{DateTime, SecondsFormat, Utc};
use fleetnotify_core::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub use deliveries::{DeliveriesRepository, DeliveryWrite};
pub use inbox::InboxRepository;
pub use jobs::JobsRepository;
pub use link_codes::LinkCodesRepository;
pub use preferences::PreferencesRepository;
pub use templates::TemplatesRepository;
pub use tokens::TokensRepository;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DbError(e.to_string()))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        info!("Connecting to database: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(db_err)?;

        // Contact details and OA tokens live here
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set database file permissions: {}", e);
            }
        }

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(db_err)?;

        info!("Database initialized");
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn jobs(&self) -> JobsRepository {
        JobsRepository::new(self.pool.clone())
    }

    pub fn templates(&self) -> TemplatesRepository {
        TemplatesRepository::new(self.pool.clone())
    }

    pub fn deliveries(&self) -> DeliveriesRepository {
        DeliveriesRepository::new(self.pool.clone())
    }

    pub fn preferences(&self) -> PreferencesRepository {
        PreferencesRepository::new(self.pool.clone())
    }

    pub fn link_codes(&self) -> LinkCodesRepository {
        LinkCodesRepository::new(self.pool.clone())
    }

    pub fn tokens(&self) -> TokensRepository {
        TokensRepository::new(self.pool.clone())
    }

    pub fn inbox(&self) -> InboxRepository {
        InboxRepository::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::DbError(e.to_string())
}

/// Timestamps are stored as fixed-width UTC RFC 3339 so they sort as text
pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::db(format!("Invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}
