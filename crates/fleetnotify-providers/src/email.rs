//! Email delivery through an HTTP mail API

use crate::error::{ProviderError, Result};
use crate::Provider;
use async_trait::async_trait;
use fleetnotify_core::{DeliveryTarget, EmailConfig, Payload, ProviderResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const PROVIDER: &str = "email";

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: String,
}

#[derive(Debug, Default, Deserialize)]
struct EmailResponse {
    id: Option<String>,
}

pub struct EmailProvider {
    client: reqwest::Client,
    config: Option<EmailConfig>,
}

impl EmailProvider {
    pub fn new(client: reqwest::Client, config: Option<EmailConfig>) -> Self {
        Self { client, config }
    }

    async fn post(&self, to: &str, payload: &Payload) -> Result<Option<String>> {
        let config = self.config.as_ref().ok_or(ProviderError::NotConfigured)?;
        let request = EmailRequest {
            from: &config.from,
            to,
            subject: &payload.title,
            html_body: html_body(payload),
        };

        debug!("Sending email to {}", to);

        let response = self
            .client
            .post(&config.api_url)
            .bearer_auth(&config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Email API failed. Status: {}, Body: {}", status, body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Mail APIs differ in what they return; an id is optional
        let body: EmailResponse = response.json().await.unwrap_or_default();
        Ok(body.id)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn html_body(payload: &Payload) -> String {
    let mut html = format!("<p>{}</p>", escape_html(&payload.body).replace('\n', "<br>"));
    if let Some(url) = payload.action_url.as_deref().filter(|u| !u.is_empty()) {
        let url = escape_html(url);
        html.push_str(&format!("<p><a href=\"{}\">{}</a></p>", url, url));
    }
    html
}

#[async_trait]
impl Provider for EmailProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, target: &DeliveryTarget, payload: &Payload) -> ProviderResult {
        let to = match target.email.as_deref().filter(|e| !e.is_empty()) {
            Some(to) => to,
            None => return ProviderResult::failed(PROVIDER, "NO_TARGET", "no email address"),
        };

        match self.post(to, payload).await {
            Ok(id) => ProviderResult::sent(PROVIDER, id),
            Err(e) => e.into_result(PROVIDER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetnotify_core::DeliveryStatus;

    fn payload() -> Payload {
        Payload {
            title: "Booking confirmed".to_string(),
            body: "Your car is ready".to_string(),
            action_url: Some("https://fleet.example/b/1".to_string()),
        }
    }

    #[test]
    fn test_html_body_links_action() {
        assert_eq!(
            html_body(&payload()),
            "<p>Your car is ready</p><p><a href=\"https://fleet.example/b/1\">https://fleet.example/b/1</a></p>"
        );
    }

    #[test]
    fn test_html_body_escapes_text() {
        let payload = Payload {
            title: "t".to_string(),
            body: "<b>5 > 3</b>\nbye".to_string(),
            action_url: None,
        };
        assert_eq!(html_body(&payload), "<p>&lt;b&gt;5 &gt; 3&lt;/b&gt;<br>bye</p>");
    }

    #[tokio::test]
    async fn test_unconfigured_email_fails() {
        let provider = EmailProvider::new(reqwest::Client::new(), None);
        let target = DeliveryTarget {
            email: Some("an@example.com".to_string()),
            ..Default::default()
        };
        let result = provider.send(&target, &payload()).await;
        assert_eq!(result.status, DeliveryStatus::Failed);
        assert_eq!(result.error_code.as_deref(), Some("NOT_CONFIGURED"));
    }

    #[tokio::test]
    async fn test_missing_address_fails() {
        let provider = EmailProvider::new(reqwest::Client::new(), None);
        let result = provider.send(&DeliveryTarget::default(), &payload()).await;
        assert_eq!(result.error_code.as_deref(), Some("NO_TARGET"));
    }
}
