//! Orchestrator - fan a notification job out to its channels
//!
//! For each recipient the orchestrator renders the payload, picks the channel
//! set and applies the recipient's preferences:
//! - in-app is written to the inbox immediately, whatever the hour
//! - opted-out channels are recorded as `skipped` (`OPTED_OUT`)
//! - other channels are deferred as `pending` during quiet hours, or
//!   enqueued on the [`DispatchQueue`] otherwise
//!
//! A job whose template is missing fails with `template_not_found` before
//! anything is dispatched. A processed job is left `processing`.

use chrono::{DateTime, Utc};
use fleetnotify_core::template::render;
use fleetnotify_core::{
    delivery_id, recipient_key, Channel, InboxItem, JobStatus, NotificationJob, Payload, Priority,
    ProviderResult, Result, Template, UserPreferences, DEFAULT_CHANNELS, FALLBACK_LOCALE,
};
use fleetnotify_db::{Database, DeliveryWrite};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::queue::{DispatchQueue, DispatchTask};
use crate::worker::WorkerRequest;

pub const TEMPLATE_NOT_FOUND: &str = "template_not_found";
const INAPP_PROVIDER: &str = "inapp";

/// Counters of one orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    pub recipients: usize,
    pub skipped_recipients: usize,
    pub inapp: usize,
    pub enqueued: usize,
    pub deferred: usize,
    pub opted_out: usize,
    pub template_missing: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    db: Database,
    queue: Arc<dyn DispatchQueue>,
}

impl Orchestrator {
    pub fn new(db: Database, queue: Arc<dyn DispatchQueue>) -> Self {
        Self { db, queue }
    }

    /// Process a job as of now
    pub async fn run(&self, job: &NotificationJob) -> Result<FanOut> {
        self.run_at(job, Utc::now()).await
    }

    /// Process a job, evaluating quiet hours at `now`
    pub async fn run_at(&self, job: &NotificationJob, now: DateTime<Utc>) -> Result<FanOut> {
        info!(job_id = %job.id, "Processing notification job");
        let jobs = self.db.jobs();
        jobs.increment_attempts(&job.id).await?;

        let mut fan_out = FanOut::default();

        let template = match job.template_id.as_deref().filter(|id| !id.is_empty()) {
            Some(template_id) => match self.db.templates().get(template_id).await? {
                Some(template) => Some(template),
                None => {
                    warn!(job_id = %job.id, template_id, "Template not found, failing job");
                    jobs.advance_status(&job.id, JobStatus::Failed, Some(TEMPLATE_NOT_FOUND))
                        .await?;
                    fan_out.template_missing = true;
                    return Ok(fan_out);
                }
            },
            None => None,
        };

        let channels = resolve_channels(job, template.as_ref());

        match (job.uid.as_deref().filter(|u| !u.is_empty()), job.topic.as_deref()) {
            (Some(uid), _) => {
                fan_out.recipients += 1;
                self.fan_out_to_user(job, template.as_ref(), &channels, uid, now, &mut fan_out)
                    .await?;
            }
            (None, Some(topic)) if !topic.is_empty() => {
                self.send_to_topic(job, template.as_ref(), topic, &mut fan_out).await?;
            }
            _ => warn!(job_id = %job.id, "Job has no audience"),
        }

        jobs.advance_status(&job.id, JobStatus::Processing, None).await?;
        info!(
            job_id = %job.id,
            enqueued = fan_out.enqueued,
            deferred = fan_out.deferred,
            inapp = fan_out.inapp,
            "Job fanned out"
        );
        Ok(fan_out)
    }

    async fn fan_out_to_user(
        &self,
        job: &NotificationJob,
        template: Option<&Template>,
        channels: &[Channel],
        uid: &str,
        now: DateTime<Utc>,
        fan_out: &mut FanOut,
    ) -> Result<()> {
        let prefs = match self.db.preferences().get(uid).await? {
            Some(prefs) => prefs,
            None => {
                debug!(job_id = %job.id, uid, "No preferences, skipping recipient");
                fan_out.skipped_recipients += 1;
                return Ok(());
            }
        };

        let locale = prefs
            .locale
            .as_deref()
            .or(job.locale.as_deref())
            .unwrap_or(FALLBACK_LOCALE);
        let payload = render_payload(job, template, locale);
        let quiet = in_quiet_hours(job, &prefs, now);
        let key = recipient_key(Some(uid), None);

        for &channel in channels {
            let id = delivery_id(&job.id, channel, &key);

            if !prefs.allows(channel) {
                let result = ProviderResult::skipped(channel.as_str(), "OPTED_OUT", "channel disabled by user");
                self.db
                    .deliveries()
                    .record_outcome(&DeliveryWrite {
                        id: &id,
                        job_id: &job.id,
                        uid: Some(uid),
                        channel,
                        result: &result,
                    })
                    .await?;
                fan_out.opted_out += 1;
                continue;
            }

            if channel == Channel::InApp {
                self.send_inapp(job, uid, &id, &payload).await;
                fan_out.inapp += 1;
                continue;
            }

            if quiet {
                self.db
                    .deliveries()
                    .mark_deferred(&id, &job.id, Some(uid), channel)
                    .await?;
                fan_out.deferred += 1;
                continue;
            }

            let task = DispatchTask {
                channel,
                request: WorkerRequest {
                    job_id: Some(job.id.clone()),
                    uid: Some(uid.to_string()),
                    payload: Some(payload.clone()),
                    target: prefs.target_for(channel),
                },
            };
            match self.queue.enqueue(task).await {
                Ok(()) => fan_out.enqueued += 1,
                Err(e) => warn!(job_id = %job.id, %channel, error = %e, "Failed to enqueue dispatch task"),
            }
        }

        Ok(())
    }

    /// Topic audience: one push to the topic, no preferences involved
    async fn send_to_topic(
        &self,
        job: &NotificationJob,
        template: Option<&Template>,
        topic: &str,
        fan_out: &mut FanOut,
    ) -> Result<()> {
        let locale = job.locale.as_deref().unwrap_or(FALLBACK_LOCALE);
        let task = DispatchTask {
            channel: Channel::Push,
            request: WorkerRequest {
                job_id: Some(job.id.clone()),
                uid: None,
                payload: Some(render_payload(job, template, locale)),
                target: fleetnotify_core::DeliveryTarget {
                    topic: Some(topic.to_string()),
                    ..Default::default()
                },
            },
        };
        match self.queue.enqueue(task).await {
            Ok(()) => fan_out.enqueued += 1,
            Err(e) => warn!(job_id = %job.id, error = %e, "Failed to enqueue topic push"),
        }
        Ok(())
    }

    /// Best effort: failures are logged and swallowed
    async fn send_inapp(&self, job: &NotificationJob, uid: &str, id: &str, payload: &Payload) {
        let item = InboxItem {
            id: uuid::Uuid::new_v4().simple().to_string(),
            uid: uid.to_string(),
            job_id: job.id.clone(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            action_url: payload.action_url.clone(),
            read: false,
            created_at: Utc::now(),
        };
        if let Err(e) = self.db.inbox().insert(&item).await {
            warn!(job_id = %job.id, uid, error = %e, "In-app insert failed");
            return;
        }

        let result = ProviderResult::sent(INAPP_PROVIDER, Some(item.id.clone()));
        let write = DeliveryWrite {
            id,
            job_id: &job.id,
            uid: Some(uid),
            channel: Channel::InApp,
            result: &result,
        };
        if let Err(e) = self.db.deliveries().record_attempt(&write).await {
            warn!(job_id = %job.id, uid, error = %e, "In-app delivery record failed");
        }
    }
}

/// Job channels, else template channels, else the defaults
pub fn resolve_channels(job: &NotificationJob, template: Option<&Template>) -> Vec<Channel> {
    let mut channels = if !job.required_channels.is_empty() {
        job.required_channels.clone()
    } else {
        match template {
            Some(t) if !t.channels.is_empty() => t.channels.clone(),
            _ => DEFAULT_CHANNELS.to_vec(),
        }
    };
    channels.sort();
    channels.dedup();
    channels
}

/// Template text for the locale (then the fallback locale), else the job's own text
pub fn render_payload(job: &NotificationJob, template: Option<&Template>, locale: &str) -> Payload {
    let (title, body) = template
        .and_then(|t| t.text_for(locale, FALLBACK_LOCALE))
        .map(|text| (text.title.as_str(), text.body.as_str()))
        .unwrap_or((job.title.as_str(), job.body.as_str()));

    Payload {
        title: render(title, &job.data),
        body: render(body, &job.data),
        action_url: job
            .action_url
            .as_deref()
            .map(|url| render(url, &job.data))
            .filter(|url| !url.is_empty()),
    }
}

/// High priority jobs ignore quiet hours
fn in_quiet_hours(job: &NotificationJob, prefs: &UserPreferences, now: DateTime<Utc>) -> bool {
    if job.priority == Priority::High {
        return false;
    }
    prefs
        .quiet_hours
        .as_ref()
        .is_some_and(|q| q.contains(now, prefs.timezone.as_deref()))
}
