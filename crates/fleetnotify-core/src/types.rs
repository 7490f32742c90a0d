//! Core types for fleetnotify

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A delivery medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    InApp,
    Push,
    Email,
    Sms,
    Zalo,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::InApp,
        Channel::Push,
        Channel::Email,
        Channel::Sms,
        Channel::Zalo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "inapp",
            Channel::Push => "push",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Zalo => "zalo",
        }
    }

    /// Worker route segment, e.g. `sendPush` for `/workers/sendPush`
    pub fn worker_route(&self) -> &'static str {
        match self {
            Channel::InApp => "sendInApp",
            Channel::Push => "sendPush",
            Channel::Email => "sendEmail",
            Channel::Sms => "sendSms",
            Channel::Zalo => "sendZalo",
        }
    }

    /// Status recorded when a worker receives no usable target.
    /// Push treats a missing device as nothing to do; addressed channels fail.
    pub fn missing_target_status(&self) -> DeliveryStatus {
        match self {
            Channel::Push | Channel::InApp => DeliveryStatus::Skipped,
            Channel::Email | Channel::Sms | Channel::Zalo => DeliveryStatus::Failed,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inapp" | "in_app" | "in-app" => Ok(Channel::InApp),
            "push" | "fcm" => Ok(Channel::Push),
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "zalo" => Ok(Channel::Zalo),
            _ => Err(Error::invalid(format!("Invalid channel: {}", s))),
        }
    }
}

/// Lifecycle of a notification job. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }

    /// Position in the lifecycle; terminal states share the last rank
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Done | JobStatus::Partial | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "partial" => Ok(JobStatus::Partial),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::invalid(format!("Invalid job status: {}", s))),
        }
    }
}

/// Job priority. High priority jobs are urgent and ignore quiet hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(Error::invalid(format!("Invalid priority: {}", s))),
        }
    }
}

/// Outcome state of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    /// Deferred by quiet hours, waiting for a later sweep
    Pending,
    Sent,
    Delivered,
    Read,
    Skipped,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Queued => "queued",
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Skipped => "skipped",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(DeliveryStatus::Queued),
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            "skipped" => Ok(DeliveryStatus::Skipped),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(Error::invalid(format!("Invalid delivery status: {}", s))),
        }
    }
}

/// A request to notify one audience via one or more channels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub id: String,
    pub uid: Option<String>,
    #[serde(default)]
    pub required_channels: Vec<Channel>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub action_url: Option<String>,
    pub topic: Option<String>,
    pub template_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub locale: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    pub last_error: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body accepted by the job intake endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub uid: Option<String>,
    #[serde(default)]
    pub required_channels: Vec<Channel>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub action_url: Option<String>,
    pub topic: Option<String>,
    pub template_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub locale: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewJob {
    /// A job needs someone to notify
    pub fn validate(&self) -> Result<()> {
        let has_uid = self.uid.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_topic = self.topic.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_uid && !has_topic {
            return Err(Error::invalid("job needs a uid or a topic"));
        }
        Ok(())
    }
}

impl NotificationJob {
    /// Build a pending job from an intake request
    pub fn from_new(new: NewJob) -> Self {
        let now = Utc::now();
        let mut channels = new.required_channels;
        channels.sort();
        channels.dedup();

        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            uid: new.uid,
            required_channels: channels,
            title: new.title,
            body: new.body,
            action_url: new.action_url,
            topic: new.topic,
            template_id: new.template_id,
            data: new.data,
            locale: new.locale,
            priority: new.priority,
            scheduled_at: new.scheduled_at,
            attempts: 0,
            last_error: None,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Rendered message handed to the channel workers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl Payload {
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }
}

/// Channel-specific address of a recipient. Each channel reads only its fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zalo_user_id: Option<String>,
}

/// Normalized result of one provider attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider: String,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl ProviderResult {
    pub fn sent(provider: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            provider: provider.into(),
            status: DeliveryStatus::Sent,
            provider_message_id: message_id,
            error_code: None,
            error_message: None,
            meta: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn failed(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            meta: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn skipped(provider: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Skipped,
            ..Self::failed(provider, code, message)
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == DeliveryStatus::Failed
    }
}

/// Key of the recipient part of a delivery id
pub fn recipient_key(uid: Option<&str>, topic: Option<&str>) -> String {
    match (uid, topic) {
        (Some(uid), _) if !uid.is_empty() => uid.to_string(),
        (_, Some(topic)) if !topic.is_empty() => format!("topic-{}", topic),
        _ => "anonymous".to_string(),
    }
}

/// Deterministic delivery id: one record per (job, channel, recipient)
pub fn delivery_id(job_id: &str, channel: Channel, recipient_key: &str) -> String {
    format!("{}_{}_{}", job_id, channel.as_str(), recipient_key)
}

/// Outcome record of delivering one job via one channel to one recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: String,
    pub job_id: String,
    pub uid: Option<String>,
    pub channel: Channel,
    pub provider: String,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub meta: serde_json::Value,
}

/// Quiet hours window as local "HH:MM" strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: String,
    pub end: String,
}

/// Contact addresses per channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub fcm_tokens: Vec<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub zalo_user_id: Option<String>,
    pub viber_user_id: Option<String>,
}

/// Per-user delivery configuration, at most one per uid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub uid: String,
    /// Channel opt-in flags; a missing flag means opted in
    #[serde(default)]
    pub channels: HashMap<Channel, bool>,
    pub quiet_hours: Option<QuietHours>,
    #[serde(default)]
    pub contact: Contact,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    pub fn new(uid: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            channels: HashMap::new(),
            quiet_hours: None,
            contact: Contact::default(),
            locale: None,
            timezone: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn allows(&self, channel: Channel) -> bool {
        self.channels.get(&channel).copied().unwrap_or(true)
    }

    /// Address of this user on a channel
    pub fn target_for(&self, channel: Channel) -> DeliveryTarget {
        let contact = &self.contact;
        match channel {
            Channel::Push => DeliveryTarget {
                tokens: contact.fcm_tokens.clone(),
                ..Default::default()
            },
            Channel::Email => DeliveryTarget {
                email: contact.email.clone(),
                ..Default::default()
            },
            Channel::Sms => DeliveryTarget {
                phone: contact.phone.clone(),
                ..Default::default()
            },
            Channel::Zalo => DeliveryTarget {
                zalo_user_id: contact.zalo_user_id.clone(),
                phone: contact.phone.clone(),
                ..Default::default()
            },
            Channel::InApp => DeliveryTarget::default(),
        }
    }
}

/// Localized title/body pair of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateText {
    pub title: String,
    pub body: String,
}

/// Notification template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub locales: HashMap<String, TemplateText>,
}

impl Template {
    /// Text for a locale, then for the fallback locale
    pub fn text_for(&self, locale: &str, fallback: &str) -> Option<&TemplateText> {
        self.locales
            .get(locale)
            .or_else(|| self.locales.get(fallback))
    }
}

/// Single-use code binding a Zalo user to an application uid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCode {
    pub code: String,
    pub uid: String,
    pub used: bool,
    pub expires_at_ms: i64,
    pub zalo_user_id: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

impl LinkCode {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms < now_ms
    }
}

/// Why a link code could not be consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    InvalidCode,
    CodeUsed,
    CodeExpired,
    MissingUid,
}

impl LinkFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkFailure::InvalidCode => "INVALID_CODE",
            LinkFailure::CodeUsed => "CODE_USED",
            LinkFailure::CodeExpired => "CODE_EXPIRED",
            LinkFailure::MissingUid => "MISSING_UID",
        }
    }
}

impl std::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current OAuth credential of the Zalo Official Account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OaToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub refreshed_at: DateTime<Utc>,
}

/// In-app notification shown in the user's inbox
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxItem {
    pub id: String,
    pub uid: String,
    pub job_id: String,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip_names() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert_eq!("FCM".parse::<Channel>().unwrap(), Channel::Push);
        assert!("viber".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_serde_names() {
        let json = serde_json::to_string(&vec![Channel::InApp, Channel::Zalo]).unwrap();
        assert_eq!(json, r#"["inapp","zalo"]"#);
    }

    #[test]
    fn test_worker_routes() {
        assert_eq!(Channel::Push.worker_route(), "sendPush");
        assert_eq!(Channel::Zalo.worker_route(), "sendZalo");
    }

    #[test]
    fn test_job_status_only_moves_forward() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_advance_to(JobStatus::Done));
        assert!(!JobStatus::Processing.can_advance_to(JobStatus::Pending));
        assert!(!JobStatus::Processing.can_advance_to(JobStatus::Processing));
        assert!(!JobStatus::Done.can_advance_to(JobStatus::Failed));
    }

    #[test]
    fn test_delivery_id_is_deterministic() {
        let key = recipient_key(Some("u1"), None);
        assert_eq!(delivery_id("job1", Channel::Push, &key), "job1_push_u1");
        assert_eq!(
            delivery_id("job1", Channel::Push, &key),
            delivery_id("job1", Channel::Push, &recipient_key(Some("u1"), Some("news")))
        );
    }

    #[test]
    fn test_recipient_key_for_topic() {
        assert_eq!(recipient_key(None, Some("promo")), "topic-promo");
        assert_eq!(recipient_key(Some(""), None), "anonymous");
    }

    #[test]
    fn test_new_job_requires_audience() {
        assert!(NewJob::default().validate().is_err());
        let job = NewJob {
            uid: Some("u1".to_string()),
            ..Default::default()
        };
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_from_new_dedups_channels() {
        let job = NotificationJob::from_new(NewJob {
            uid: Some("u1".to_string()),
            required_channels: vec![Channel::Zalo, Channel::Push, Channel::Zalo],
            ..Default::default()
        });
        assert_eq!(job.required_channels, vec![Channel::Push, Channel::Zalo]);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_preferences_opt_in_default() {
        let mut prefs = UserPreferences::new("u1");
        assert!(prefs.allows(Channel::Email));
        prefs.channels.insert(Channel::Email, false);
        assert!(!prefs.allows(Channel::Email));
    }

    #[test]
    fn test_zalo_target_carries_phone() {
        let mut prefs = UserPreferences::new("u1");
        prefs.contact.zalo_user_id = Some("z1".to_string());
        prefs.contact.phone = Some("+84900000000".to_string());

        let target = prefs.target_for(Channel::Zalo);
        assert_eq!(target.zalo_user_id.as_deref(), Some("z1"));
        assert_eq!(target.phone.as_deref(), Some("+84900000000"));
        assert!(target.email.is_none());
    }

    #[test]
    fn test_template_locale_fallback() {
        let mut locales = HashMap::new();
        locales.insert(
            "vi".to_string(),
            TemplateText {
                title: "Xin chao".to_string(),
                body: "B".to_string(),
            },
        );
        let template = Template {
            id: "t".to_string(),
            channels: vec![],
            locales,
        };
        assert_eq!(template.text_for("en", "vi").unwrap().title, "Xin chao");
        assert!(template.text_for("en", "fr").is_none());
    }

    #[test]
    fn test_link_failure_codes() {
        assert_eq!(LinkFailure::CodeExpired.as_str(), "CODE_EXPIRED");
        assert_eq!(LinkFailure::MissingUid.to_string(), "MISSING_UID");
    }

    #[test]
    fn test_payload_completeness() {
        let payload = Payload {
            title: "t".to_string(),
            body: "  ".to_string(),
            action_url: None,
        };
        assert!(!payload.is_complete());
    }

    #[test]
    fn test_missing_target_policy() {
        assert_eq!(Channel::Push.missing_target_status(), DeliveryStatus::Skipped);
        assert_eq!(Channel::Zalo.missing_target_status(), DeliveryStatus::Failed);
    }
}
