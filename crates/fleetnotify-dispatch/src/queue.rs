//! Dispatch queue - hand-off between the orchestrator and the channel workers

use async_trait::async_trait;
use fleetnotify_core::{Channel, Result, INTERNAL_SECRET_HEADER};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::worker::WorkerRequest;

/// One delivery to perform: a channel plus the worker request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub channel: Channel,
    pub request: WorkerRequest,
}

/// Sink for dispatch tasks. Implementations decide durability and retries.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn enqueue(&self, task: DispatchTask) -> Result<()>;
}

/// Default consumer: POST each task to its worker endpoint in the background.
///
/// Delivery is fire-and-forget. Transport failures and non-2xx replies are
/// logged and dropped.
#[derive(Clone)]
pub struct HttpDispatchQueue {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpDispatchQueue {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret,
        }
    }

    pub fn worker_url(&self, channel: Channel) -> String {
        format!(
            "{}/workers/{}",
            self.base_url.trim_end_matches('/'),
            channel.worker_route()
        )
    }
}

#[async_trait]
impl DispatchQueue for HttpDispatchQueue {
    async fn enqueue(&self, task: DispatchTask) -> Result<()> {
        let url = self.worker_url(task.channel);
        let mut request = self.client.post(&url).json(&task.request);
        if let Some(secret) = &self.secret {
            request = request.header(INTERNAL_SECRET_HEADER, secret);
        }

        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Dispatched {} task to {}", task.channel, url);
                }
                Ok(response) => {
                    warn!(channel = %task.channel, status = %response.status(), "Worker rejected dispatch");
                }
                Err(e) => {
                    warn!(channel = %task.channel, error = %e, "Worker dispatch failed");
                }
            }
        });

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_url() {
        let queue = HttpDispatchQueue::new(reqwest::Client::new(), "http://127.0.0.1:8787/", None);
        assert_eq!(queue.worker_url(Channel::Push), "http://127.0.0.1:8787/workers/sendPush");
        assert_eq!(queue.worker_url(Channel::Zalo), "http://127.0.0.1:8787/workers/sendZalo");
    }

    #[tokio::test]
    async fn test_enqueue_does_not_wait_for_worker() {
        // Nothing listens on the discard port; the failure is only logged
        let queue = HttpDispatchQueue::new(reqwest::Client::new(), "http://127.0.0.1:9", Some("s".to_string()));
        let task = DispatchTask {
            channel: Channel::Sms,
            request: WorkerRequest::default(),
        };
        assert!(queue.enqueue(task).await.is_ok());
    }
}
