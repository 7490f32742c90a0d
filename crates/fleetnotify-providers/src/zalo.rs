//! Zalo Official Account messaging
//!
//! Sends a customer-service text message to a linked Zalo user. The OA access
//! token comes from a [`TokenStore`], falling back to the configured token.
//! When Zalo rejects the token as invalid or expired, the provider refreshes
//! it once, stores the new pair and retries once; the retry's outcome is final.

use crate::error::{ProviderError, Result};
use crate::Provider;
use async_trait::async_trait;
use chrono::Utc;
use fleetnotify_core::{
    DeliveryTarget, OaToken, Payload, ProviderResult, ZaloConfig, ZALO_INVALID_TOKEN_CODES,
    ZALO_MESSAGE_URL, ZALO_OAUTH_URL,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PROVIDER: &str = "zalo";

/// Reply of the OA message endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ZaloReply {
    /// 0 on success, a negative Zalo error code otherwise
    pub error: i64,
    pub message: String,
    pub message_id: Option<String>,
}

impl ZaloReply {
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    pub fn is_invalid_token(&self) -> bool {
        ZALO_INVALID_TOKEN_CODES.contains(&self.error)
    }
}

/// Token pair returned by the OAuth refresh endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Transport to the Zalo OA API
#[async_trait]
pub trait ZaloApi: Send + Sync {
    async fn send_text(&self, access_token: &str, user_id: &str, text: &str) -> Result<ZaloReply>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

/// Storage of the current OA token
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self) -> Result<Option<OaToken>>;

    async fn set(&self, token: &OaToken) -> Result<()>;
}

/// Process-local token store
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<OaToken>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: OaToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<OaToken>> {
        Ok(self.token.lock().await.clone())
    }

    async fn set(&self, token: &OaToken) -> Result<()> {
        *self.token.lock().await = Some(token.clone());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    message: String,
    data: Option<MessageData>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<i64>,
    error_name: Option<String>,
    error_description: Option<String>,
}

/// reqwest-backed [`ZaloApi`]
pub struct HttpZaloApi {
    client: reqwest::Client,
    app_id: Option<String>,
    secret_key: Option<String>,
    message_url: String,
    oauth_url: String,
}

impl HttpZaloApi {
    pub fn new(client: reqwest::Client, config: &ZaloConfig) -> Self {
        Self {
            client,
            app_id: config.app_id.clone(),
            secret_key: config.secret_key.clone(),
            message_url: ZALO_MESSAGE_URL.to_string(),
            oauth_url: ZALO_OAUTH_URL.to_string(),
        }
    }
}

#[async_trait]
impl ZaloApi for HttpZaloApi {
    async fn send_text(&self, access_token: &str, user_id: &str, text: &str) -> Result<ZaloReply> {
        let body = json!({
            "recipient": { "user_id": user_id },
            "message": { "text": text },
        });

        let response = self
            .client
            .post(&self.message_url)
            .header("access_token", access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let reply: MessageResponse = response.json().await?;
        Ok(ZaloReply {
            error: reply.error,
            message: reply.message,
            message_id: reply.data.and_then(|d| d.message_id),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let (app_id, secret_key) = match (&self.app_id, &self.secret_key) {
            (Some(app_id), Some(secret_key)) => (app_id, secret_key),
            _ => return Err(ProviderError::NotConfigured),
        };

        let response = self
            .client
            .post(&self.oauth_url)
            .header("secret_key", secret_key)
            .form(&[
                ("refresh_token", refresh_token),
                ("app_id", app_id.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: OAuthResponse = response.json().await?;
        match body.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(RefreshedToken {
                access_token,
                refresh_token: body.refresh_token,
            }),
            _ => Err(ProviderError::api(
                format!("REFRESH_{}", body.error.unwrap_or(0)),
                body.error_description
                    .or(body.error_name)
                    .unwrap_or_else(|| "refresh returned no access token".to_string()),
            )),
        }
    }
}

/// Zalo OA provider
pub struct ZaloProvider {
    api: Arc<dyn ZaloApi>,
    tokens: Arc<dyn TokenStore>,
    config: ZaloConfig,
    emulator: bool,
}

impl ZaloProvider {
    pub fn new(api: Arc<dyn ZaloApi>, tokens: Arc<dyn TokenStore>, config: ZaloConfig, emulator: bool) -> Self {
        Self {
            api,
            tokens,
            config,
            emulator,
        }
    }

    /// Stored token first, configured token otherwise
    async fn current_token(&self) -> Result<Option<OaToken>> {
        if let Some(token) = self.tokens.get().await? {
            if !token.access_token.is_empty() {
                return Ok(Some(token));
            }
        }
        Ok(self
            .config
            .oa_access_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|access_token| OaToken {
                access_token: access_token.clone(),
                refresh_token: self.config.oa_refresh_token.clone(),
                refreshed_at: Utc::now(),
            }))
    }

    /// Refresh and persist the OA token
    async fn refresh_token(&self, current: &OaToken) -> Result<OaToken> {
        let refresh_token = current
            .refresh_token
            .clone()
            .or_else(|| self.config.oa_refresh_token.clone())
            .ok_or_else(|| ProviderError::api("NO_REFRESH_TOKEN", "no refresh token available"))?;

        let refreshed = self.api.refresh(&refresh_token).await?;
        let token = OaToken {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token.or(Some(refresh_token)),
            refreshed_at: Utc::now(),
        };
        self.tokens.set(&token).await?;
        info!("Zalo OA token refreshed");
        Ok(token)
    }

    async fn deliver(&self, user_id: &str, text: &str) -> Result<ProviderResult> {
        let token = match self.current_token().await? {
            Some(token) => token,
            None => return Ok(ProviderResult::failed(PROVIDER, "NO_TOKEN", "no OA access token available")),
        };

        let reply = self.api.send_text(&token.access_token, user_id, text).await?;
        if !reply.is_invalid_token() {
            return Ok(reply_to_result(reply));
        }

        warn!("Zalo rejected OA token (error {}), refreshing", reply.error);
        let token = match self.refresh_token(&token).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Zalo token refresh failed: {}", e);
                return Ok(reply_to_result(reply).with_meta(json!({ "refreshError": e.code() })));
            }
        };

        let retry = self.api.send_text(&token.access_token, user_id, text).await?;
        Ok(reply_to_result(retry).with_meta(json!({ "tokenRefreshed": true })))
    }
}

fn reply_to_result(reply: ZaloReply) -> ProviderResult {
    if reply.is_ok() {
        ProviderResult::sent(PROVIDER, reply.message_id)
    } else {
        ProviderResult::failed(PROVIDER, reply.error.to_string(), reply.message)
    }
}

/// Zalo text body: title, body and link on separate lines, blanks dropped
pub fn compose_text(payload: &Payload) -> String {
    [
        Some(payload.title.as_str()),
        Some(payload.body.as_str()),
        payload.action_url.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

#[async_trait]
impl Provider for ZaloProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, target: &DeliveryTarget, payload: &Payload) -> ProviderResult {
        let user_id = match target.zalo_user_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => return ProviderResult::failed(PROVIDER, "NO_TARGET", "no linked Zalo user"),
        };
        let text = compose_text(payload);

        if self.emulator {
            info!("Zalo emulator mode: not contacting Zalo for user {}", user_id);
            return ProviderResult::sent(PROVIDER, Some(format!("emulator-{}", uuid::Uuid::new_v4().simple())))
                .with_meta(json!({ "emulator": true }));
        }

        debug!("Sending Zalo message to {}", user_id);
        match self.deliver(user_id, &text).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Zalo send failed: {}", e);
                e.into_result(PROVIDER)
            }
        }
    }
}
