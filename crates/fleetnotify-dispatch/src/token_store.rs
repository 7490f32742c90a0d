//! SQLite-backed Zalo OA token store

use async_trait::async_trait;
use fleetnotify_core::OaToken;
use fleetnotify_db::Database;
use fleetnotify_providers::{ProviderError, TokenStore};

/// [`TokenStore`] persisting the OA token in the `oa_token` table
#[derive(Clone)]
pub struct DbTokenStore {
    db: Database,
}

impl DbTokenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn get(&self) -> fleetnotify_providers::Result<Option<OaToken>> {
        self.db
            .tokens()
            .get()
            .await
            .map_err(|e| ProviderError::token_store(e.to_string()))
    }

    async fn set(&self, token: &OaToken) -> fleetnotify_providers::Result<()> {
        self.db
            .tokens()
            .set(token)
            .await
            .map_err(|e| ProviderError::token_store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_db;
    use chrono::Utc;

    #[tokio::test]
    async fn test_db_token_store_round_trip() {
        let (db, _dir) = setup_db().await;
        let store = DbTokenStore::new(db);
        assert!(store.get().await.unwrap().is_none());

        store
            .set(&OaToken {
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
                refreshed_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.get().await.unwrap().unwrap().access_token, "access");
    }
}
