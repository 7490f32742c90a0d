//! SMS delivery through an HTTP gateway

use crate::error::{ProviderError, Result};
use crate::Provider;
use async_trait::async_trait;
use fleetnotify_core::{DeliveryTarget, Payload, ProviderResult, SmsConfig};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const PROVIDER: &str = "sms";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmsResponse {
    message_id: Option<String>,
}

pub struct SmsProvider {
    client: reqwest::Client,
    config: Option<SmsConfig>,
}

impl SmsProvider {
    pub fn new(client: reqwest::Client, config: Option<SmsConfig>) -> Self {
        Self { client, config }
    }

    fn format_message(payload: &Payload) -> String {
        format!("{}: {}", payload.title.trim(), payload.body.trim())
    }

    async fn post(&self, phone: &str, payload: &Payload) -> Result<Option<String>> {
        let config = self.config.as_ref().ok_or(ProviderError::NotConfigured)?;
        let mut body = json!({
            "to": phone,
            "message": Self::format_message(payload),
        });
        if let Some(sender) = &config.sender {
            body["sender"] = json!(sender);
        }

        debug!(phone = %phone, "Sending SMS");

        let response = self
            .client
            .post(&config.api_url)
            .bearer_auth(&config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(phone = %phone, status = %status, "SMS gateway returned error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: SmsResponse = response.json().await.unwrap_or_default();
        Ok(body.message_id)
    }
}

#[async_trait]
impl Provider for SmsProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, target: &DeliveryTarget, payload: &Payload) -> ProviderResult {
        let phone = match target.phone.as_deref().filter(|p| !p.is_empty()) {
            Some(phone) => phone,
            None => return ProviderResult::failed(PROVIDER, "NO_TARGET", "no phone number"),
        };

        match self.post(phone, payload).await {
            Ok(id) => ProviderResult::sent(PROVIDER, id),
            Err(e) => e.into_result(PROVIDER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetnotify_core::DeliveryStatus;

    #[test]
    fn test_format_message() {
        let payload = Payload {
            title: "Fleet ".to_string(),
            body: "Pickup at 9:00".to_string(),
            action_url: None,
        };
        assert_eq!(SmsProvider::format_message(&payload), "Fleet: Pickup at 9:00");
    }

    #[tokio::test]
    async fn test_unconfigured_sms_fails() {
        let provider = SmsProvider::new(reqwest::Client::new(), None);
        let target = DeliveryTarget {
            phone: Some("+84901234567".to_string()),
            ..Default::default()
        };
        let result = provider
            .send(
                &target,
                &Payload {
                    title: "t".to_string(),
                    body: "b".to_string(),
                    action_url: None,
                },
            )
            .await;
        assert_eq!(result.status, DeliveryStatus::Failed);
        assert_eq!(result.error_code.as_deref(), Some("NOT_CONFIGURED"));
    }
}
