//! Channel worker - one provider attempt per request
//!
//! A worker request names a job, a rendered payload and a channel target.
//! The worker validates it, calls the channel's provider under a timeout and
//! merges the outcome into the delivery record keyed by
//! `{jobId}_{channel}_{recipientKey}`. Business failures (no target, provider
//! error, timeout) are normal responses with `ok: false`; only invalid input
//! and storage failures surface as errors.

use fleetnotify_core::{
    delivery_id, recipient_key, Channel, DeliveryStatus, DeliveryTarget, Error, Payload,
    ProviderResult, Result,
};
use fleetnotify_db::{Database, DeliveryWrite};
use fleetnotify_providers::Providers;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Body of `POST /workers/send{Channel}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub payload: Option<Payload>,
    #[serde(default)]
    pub target: DeliveryTarget,
}

/// Worker reply: `result` on success, `error` (a code) otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProviderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub delivery_id: String,
}

/// Executes worker requests against the configured providers
#[derive(Clone)]
pub struct ChannelWorker {
    db: Database,
    providers: Providers,
    timeout: Duration,
}

impl ChannelWorker {
    pub fn new(db: Database, providers: Providers, timeout: Duration) -> Self {
        Self {
            db,
            providers,
            timeout,
        }
    }

    pub async fn handle(&self, channel: Channel, request: WorkerRequest) -> Result<WorkerResponse> {
        let job_id = request
            .job_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::invalid("jobId is required"))?;
        let payload = request
            .payload
            .filter(Payload::is_complete)
            .ok_or_else(|| Error::invalid("payload.title and payload.body are required"))?;
        let provider = self
            .providers
            .for_channel(channel)
            .ok_or_else(|| Error::invalid(format!("channel {} has no worker", channel)))?;

        let uid = request.uid.filter(|u| !u.is_empty());
        let target = normalize_target(request.target);
        let key = recipient_key(uid.as_deref(), target.topic.as_deref());
        let id = delivery_id(&job_id, channel, &key);

        let result = if has_target(channel, &target) {
            let budget = self.timeout * (outbound_calls(channel, &target) + 1);
            match tokio::time::timeout(budget, provider.send(&target, &payload)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(delivery_id = %id, "Provider {} timed out", provider.name());
                    ProviderResult::failed(
                        provider.name(),
                        "TIMEOUT",
                        format!("no answer within {:?}", budget),
                    )
                }
            }
        } else {
            let message = format!("no usable {} target", channel);
            match channel.missing_target_status() {
                DeliveryStatus::Skipped => ProviderResult::skipped(provider.name(), "NO_TARGET", message),
                _ => ProviderResult::failed(provider.name(), "NO_TARGET", message),
            }
        };

        self.db
            .deliveries()
            .record_attempt(&DeliveryWrite {
                id: &id,
                job_id: &job_id,
                uid: uid.as_deref(),
                channel,
                result: &result,
            })
            .await?;

        let ok = matches!(
            result.status,
            DeliveryStatus::Sent | DeliveryStatus::Delivered | DeliveryStatus::Read
        );
        info!(delivery_id = %id, status = %result.status.as_str(), "Delivery attempt recorded");

        Ok(WorkerResponse {
            ok,
            error: (!ok).then(|| result.error_code.clone().unwrap_or_else(|| result.status.as_str().to_string())),
            result: Some(result),
            delivery_id: id,
        })
    }
}

/// Upper bound on outbound requests one provider send makes. Each request
/// carries its own timeout; the worker deadline covers all of them.
pub fn outbound_calls(channel: Channel, target: &DeliveryTarget) -> u32 {
    match channel {
        Channel::Push if !target.tokens.is_empty() => target.tokens.len() as u32,
        // send, refresh, retry
        Channel::Zalo => 3,
        _ => 1,
    }
}

/// Trim addresses, drop blanks and duplicate tokens
pub fn normalize_target(target: DeliveryTarget) -> DeliveryTarget {
    fn clean(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    let mut tokens: Vec<String> = Vec::with_capacity(target.tokens.len());
    for token in target.tokens {
        let token = token.trim().to_string();
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    DeliveryTarget {
        tokens,
        token: clean(target.token),
        topic: clean(target.topic),
        email: clean(target.email),
        phone: clean(target.phone),
        zalo_user_id: clean(target.zalo_user_id),
    }
}

/// Whether a normalized target can be delivered to on `channel`
pub fn has_target(channel: Channel, target: &DeliveryTarget) -> bool {
    match channel {
        Channel::Push => !target.tokens.is_empty() || target.token.is_some() || target.topic.is_some(),
        Channel::Email => target.email.is_some(),
        Channel::Sms => target.phone.is_some(),
        Channel::Zalo => target.zalo_user_id.is_some(),
        Channel::InApp => true,
    }
}
