//! Mock implementations for testing

use crate::Provider;
use async_trait::async_trait;
use fleetnotify_core::{DeliveryTarget, Payload, ProviderResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A mock provider that records every call and returns a fixed outcome
pub struct MockProvider {
    name: &'static str,
    /// Targets and payloads received, in order
    calls: Arc<Mutex<Vec<(DeliveryTarget, Payload)>>>,
    call_count: AtomicUsize,
    outcome: Option<ProviderResult>,
    delay: Option<Duration>,
}

impl MockProvider {
    /// A provider that always reports `sent`
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            calls: Arc::new(Mutex::new(Vec::new())),
            call_count: AtomicUsize::new(0),
            outcome: None,
            delay: None,
        }
    }

    /// A provider that always returns `outcome`
    pub fn returning(name: &'static str, outcome: ProviderResult) -> Self {
        Self {
            outcome: Some(outcome),
            ..Self::named(name)
        }
    }

    /// Sleep before answering, to exercise caller timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub async fn calls(&self) -> Vec<(DeliveryTarget, Payload)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, target: &DeliveryTarget, payload: &Payload) -> ProviderResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().await.push((target.clone(), payload.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Some(outcome) => outcome.clone(),
            None => ProviderResult::sent(self.name, Some(format!("{}-msg-{}", self.name, self.call_count()))),
        }
    }
}
