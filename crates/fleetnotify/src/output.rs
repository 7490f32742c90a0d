//! Table and JSON output

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use fleetnotify_core::{Delivery, DeliveryStatus, JobStatus, NotificationJob};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{settings::Style, Table, Tabled};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

#[derive(Tabled)]
pub struct DeliveryRow {
    #[tabled(rename = "channel")]
    pub channel: String,
    #[tabled(rename = "recipient")]
    pub recipient: String,
    #[tabled(rename = "provider")]
    pub provider: String,
    #[tabled(rename = "status")]
    pub status: String,
    #[tabled(rename = "↺")]
    pub attempts: u32,
    #[tabled(rename = "error")]
    pub error: String,
    #[tabled(rename = "sent")]
    pub sent: String,
}

impl From<&Delivery> for DeliveryRow {
    fn from(delivery: &Delivery) -> Self {
        let prefix = format!("{}_{}_", delivery.job_id, delivery.channel.as_str());
        DeliveryRow {
            channel: delivery.channel.to_string(),
            recipient: delivery
                .id
                .strip_prefix(&prefix)
                .unwrap_or(&delivery.id)
                .to_string(),
            provider: delivery.provider.clone(),
            status: colored_delivery_status(delivery.status),
            attempts: delivery.attempts,
            error: delivery.error_code.clone().unwrap_or_else(|| "-".to_string()),
            sent: delivery
                .sent_at
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn colored_delivery_status(status: DeliveryStatus) -> String {
    let text = status.as_str();
    match status {
        DeliveryStatus::Sent | DeliveryStatus::Delivered | DeliveryStatus::Read => text.green().to_string(),
        DeliveryStatus::Queued | DeliveryStatus::Pending => text.yellow().to_string(),
        DeliveryStatus::Skipped => text.dimmed().to_string(),
        DeliveryStatus::Failed => text.red().bold().to_string(),
    }
}

fn colored_job_status(status: JobStatus) -> String {
    let text = status.as_str();
    match status {
        JobStatus::Pending | JobStatus::Processing => text.yellow().to_string(),
        JobStatus::Done => text.green().to_string(),
        JobStatus::Partial => text.cyan().to_string(),
        JobStatus::Failed => text.red().bold().to_string(),
    }
}

pub fn format_time(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn print_job(job: &NotificationJob) {
    let channels = if job.required_channels.is_empty() {
        "(template)".to_string()
    } else {
        job.required_channels
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let audience = match (&job.uid, &job.topic) {
        (Some(uid), _) => format!("user {}", uid),
        (None, Some(topic)) => format!("topic {}", topic),
        (None, None) => "-".to_string(),
    };

    println!("{} {}", "Job".bold(), job.id);
    println!("  {:<10} {}", "status", colored_job_status(job.status));
    println!("  {:<10} {}", "audience", audience);
    println!("  {:<10} {}", "channels", channels);
    if let Some(template) = &job.template_id {
        println!("  {:<10} {}", "template", template);
    } else {
        println!("  {:<10} {}", "title", job.title);
    }
    println!("  {:<10} {}", "priority", job.priority.as_str());
    println!("  {:<10} {}", "attempts", job.attempts);
    println!("  {:<10} {}", "created", format_time(&job.created_at));
    if let Some(at) = &job.scheduled_at {
        println!("  {:<10} {}", "scheduled", format_time(at));
    }
    if let Some(error) = &job.last_error {
        println!("  {:<10} {}", "error", error.red());
    }
}

pub fn print_deliveries(deliveries: &[Delivery]) {
    if deliveries.is_empty() {
        println!("No deliveries yet");
        return;
    }

    let rows: Vec<DeliveryRow> = deliveries.iter().map(DeliveryRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetnotify_core::Channel;
    use serde_json::json;

    #[test]
    fn test_delivery_row() {
        colored::control::set_override(false);
        let delivery = Delivery {
            id: "job1_zalo_u1".to_string(),
            job_id: "job1".to_string(),
            uid: Some("u1".to_string()),
            channel: Channel::Zalo,
            provider: "zalo".to_string(),
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error_code: Some("-124".to_string()),
            error_message: Some("Access token invalid".to_string()),
            attempts: 2,
            created_at: Utc::now(),
            sent_at: None,
            delivered_at: None,
            read_at: None,
            meta: json!({}),
        };

        let row = DeliveryRow::from(&delivery);
        assert_eq!(row.channel, "zalo");
        assert_eq!(row.recipient, "u1");
        assert_eq!(row.status, "failed");
        assert_eq!(row.error, "-124");
        assert_eq!(row.sent, "-");
    }

    #[test]
    fn test_topic_recipient_keeps_its_prefix() {
        colored::control::set_override(false);
        let delivery = Delivery {
            id: "job1_push_topic-promo_summer".to_string(),
            job_id: "job1".to_string(),
            uid: None,
            channel: Channel::Push,
            provider: "fcm".to_string(),
            status: DeliveryStatus::Sent,
            provider_message_id: Some("m1".to_string()),
            error_code: None,
            error_message: None,
            attempts: 1,
            created_at: Utc::now(),
            sent_at: Some(Utc::now()),
            delivered_at: None,
            read_at: None,
            meta: json!({}),
        };

        let row = DeliveryRow::from(&delivery);
        assert_eq!(row.recipient, "topic-promo_summer");
        assert_ne!(row.sent, "-");
    }
}
