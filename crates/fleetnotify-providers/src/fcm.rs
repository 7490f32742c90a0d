//! Push delivery through Firebase Cloud Messaging HTTP v1

use crate::error::{ProviderError, Result};
use crate::Provider;
use async_trait::async_trait;
use fleetnotify_core::{DeliveryTarget, FcmConfig, Payload, ProviderResult, FCM_API_BASE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

const PROVIDER: &str = "fcm";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    notification: Notification<'a>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    data: HashMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
struct Notification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    status: Option<String>,
    message: Option<String>,
}

/// Where a single FCM message goes
#[derive(Debug, Clone, Copy)]
enum Destination<'a> {
    Token(&'a str),
    Topic(&'a str),
}

/// FCM push provider
pub struct FcmProvider {
    client: reqwest::Client,
    config: Option<FcmConfig>,
    api_base: String,
}

impl FcmProvider {
    pub fn new(client: reqwest::Client, config: Option<FcmConfig>) -> Self {
        Self {
            client,
            config,
            api_base: FCM_API_BASE.to_string(),
        }
    }

    /// Point the provider at another API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_url(&self, project_id: &str) -> String {
        format!(
            "{}/projects/{}/messages:send",
            self.api_base.trim_end_matches('/'),
            project_id
        )
    }

    /// Send one message, returning the FCM message name
    async fn send_one(&self, destination: Destination<'_>, payload: &Payload) -> Result<String> {
        let config = self.config.as_ref().ok_or(ProviderError::NotConfigured)?;

        let mut data = HashMap::new();
        if let Some(url) = payload.action_url.as_deref() {
            data.insert("actionUrl", url);
        }
        let (token, topic) = match destination {
            Destination::Token(token) => (Some(token), None),
            Destination::Topic(topic) => (None, Some(topic)),
        };
        let request = SendRequest {
            message: Message {
                token,
                topic,
                notification: Notification {
                    title: &payload.title,
                    body: &payload.body,
                },
                data,
            },
        };

        debug!("Sending FCM message to {:?}", destination);

        let response = self
            .client
            .post(self.send_url(&config.project_id))
            .bearer_auth(&config.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(body) => ProviderError::api(
                    body.error
                        .status
                        .unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
                    body.error.message.unwrap_or(text),
                ),
                Err(_) => ProviderError::Status {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        let body: SendResponse = serde_json::from_str(&text)?;
        Ok(body.name.unwrap_or_default())
    }
}

/// Fold per-token outcomes of a multicast into one result.
///
/// Any success makes the delivery `sent`; the counts and the first error
/// are kept in `meta` either way.
pub fn aggregate_multicast(outcomes: Vec<Result<String>>) -> ProviderResult {
    let mut success_count = 0usize;
    let mut failure_count = 0usize;
    let mut first_message_id = None;
    let mut first_error: Option<ProviderError> = None;

    for outcome in outcomes {
        match outcome {
            Ok(id) => {
                success_count += 1;
                if first_message_id.is_none() {
                    first_message_id = Some(id);
                }
            }
            Err(e) => {
                failure_count += 1;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    let mut meta = json!({
        "successCount": success_count,
        "failureCount": failure_count,
    });
    if let Some(e) = &first_error {
        meta["firstError"] = json!({ "code": e.code(), "message": e.to_string() });
    }

    match (success_count, first_error) {
        (0, Some(e)) => e.into_result(PROVIDER).with_meta(meta),
        (0, None) => ProviderResult::skipped(PROVIDER, "NO_TARGET", "no device tokens").with_meta(meta),
        _ => ProviderResult::sent(PROVIDER, first_message_id).with_meta(meta),
    }
}

#[async_trait]
impl Provider for FcmProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, target: &DeliveryTarget, payload: &Payload) -> ProviderResult {
        if !target.tokens.is_empty() {
            let mut outcomes = Vec::with_capacity(target.tokens.len());
            for token in &target.tokens {
                outcomes.push(self.send_one(Destination::Token(token), payload).await);
            }
            let result = aggregate_multicast(outcomes);
            if result.is_failed() {
                warn!("FCM multicast failed for all {} tokens", target.tokens.len());
            }
            return result;
        }

        let destination = match (target.topic.as_deref(), target.token.as_deref()) {
            (Some(topic), _) => Destination::Topic(topic),
            (None, Some(token)) => Destination::Token(token),
            (None, None) => {
                return ProviderResult::skipped(PROVIDER, "NO_TARGET", "no token or topic");
            }
        };

        match self.send_one(destination, payload).await {
            Ok(id) => ProviderResult::sent(PROVIDER, Some(id)),
            Err(e) => {
                warn!("FCM send failed: {}", e);
                e.into_result(PROVIDER)
            }
        }
    }
}
