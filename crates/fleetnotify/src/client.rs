//! HTTP client for the daemon's internal routes

use anyhow::{bail, Context, Result};
use fleetnotify_core::INTERNAL_SECRET_HEADER;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, secret: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(self.http.get(self.url(path))).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn send(&self, mut request: RequestBuilder) -> Result<Value> {
        if let Some(secret) = &self.secret {
            request = request.header(INTERNAL_SECRET_HEADER, secret);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("cannot reach fleetnotify at {}", self.base_url))?;
        let status = response.status();
        debug!("Daemon answered {}", status);

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("unexpected reply from daemon ({})", status))?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"));
            bail!("{} ({})", message, status.as_u16());
        }
        Ok(body)
    }
}
