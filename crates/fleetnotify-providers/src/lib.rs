//! fleetnotify delivery providers
//!
//! One adapter per external channel, all normalizing their outcome into a
//! [`ProviderResult`]:
//! - Push via Firebase Cloud Messaging (HTTP v1)
//! - Zalo Official Account messages, with token refresh
//! - Email and SMS through HTTP gateways

pub mod email;
mod error;
pub mod fcm;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod sms;
pub mod zalo;

pub use email::EmailProvider;
pub use error::{ProviderError, Result};
pub use fcm::FcmProvider;
pub use sms::SmsProvider;
pub use zalo::{HttpZaloApi, MemoryTokenStore, TokenStore, ZaloApi, ZaloProvider};

use async_trait::async_trait;
use fleetnotify_core::{Channel, DeliveryTarget, Payload, ProviderResult, ServiceConfig};
use std::sync::Arc;
use std::time::Duration;

/// Trait for delivery backends
///
/// Adapters never return transport errors to the caller: every failure is
/// folded into a `failed` [`ProviderResult`] carrying a stable error code.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name stored on delivery records
    fn name(&self) -> &'static str;

    /// Deliver one payload to one target
    async fn send(&self, target: &DeliveryTarget, payload: &Payload) -> ProviderResult;
}

/// The provider serving each externally delivered channel
#[derive(Clone)]
pub struct Providers {
    push: Arc<dyn Provider>,
    email: Arc<dyn Provider>,
    sms: Arc<dyn Provider>,
    zalo: Arc<dyn Provider>,
}

impl Providers {
    pub fn new(
        push: Arc<dyn Provider>,
        email: Arc<dyn Provider>,
        sms: Arc<dyn Provider>,
        zalo: Arc<dyn Provider>,
    ) -> Self {
        Self {
            push,
            email,
            sms,
            zalo,
        }
    }

    /// Build the HTTP-backed providers from service configuration
    pub fn from_config(config: &ServiceConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;
        let zalo_api = Arc::new(HttpZaloApi::new(client.clone(), &config.zalo));

        Ok(Self {
            push: Arc::new(FcmProvider::new(client.clone(), config.fcm.clone())),
            email: Arc::new(EmailProvider::new(client.clone(), config.email.clone())),
            sms: Arc::new(SmsProvider::new(client, config.sms.clone())),
            zalo: Arc::new(ZaloProvider::new(
                zalo_api,
                tokens,
                config.zalo.clone(),
                config.emulator,
            )),
        })
    }

    /// Provider for a channel. In-app has none: it is written straight to the inbox.
    pub fn for_channel(&self, channel: Channel) -> Option<Arc<dyn Provider>> {
        match channel {
            Channel::Push => Some(self.push.clone()),
            Channel::Email => Some(self.email.clone()),
            Channel::Sms => Some(self.sms.clone()),
            Channel::Zalo => Some(self.zalo.clone()),
            Channel::InApp => None,
        }
    }
}
