//! Submit command implementation

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use fleetnotify_core::NewJob;
use serde_json::Value;

use crate::cli::SubmitArgs;
use crate::client::ApiClient;
use crate::output::{is_json_mode, print_info, print_json, print_success};

pub fn build_job(args: SubmitArgs) -> Result<NewJob> {
    let job = NewJob {
        uid: args.uid,
        required_channels: args.channels,
        title: args.title,
        body: args.body,
        action_url: args.action_url,
        topic: args.topic,
        template_id: args.template,
        data: args.data.unwrap_or(Value::Null),
        locale: args.locale,
        priority: args.priority,
        scheduled_at: args.delay.map(|secs| Utc::now() + Duration::seconds(secs as i64)),
    };
    job.validate()?;
    Ok(job)
}

pub async fn execute(client: &ApiClient, args: SubmitArgs) -> Result<()> {
    let job = build_job(args)?;
    let reply = client.post("/jobs", &job).await?;

    if is_json_mode() {
        print_json(&reply);
        return Ok(());
    }

    let job_id = reply["jobId"]
        .as_str()
        .context("daemon reply has no jobId")?;
    print_success(&format!("Job {} submitted", job_id));
    if let Some(at) = &job.scheduled_at {
        print_info(&format!("Scheduled for {}", crate::output::format_time(at)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetnotify_core::{Channel, Priority};

    fn args() -> SubmitArgs {
        SubmitArgs {
            uid: Some("u1".to_string()),
            topic: None,
            channels: vec![Channel::Zalo],
            title: String::new(),
            body: String::new(),
            template: Some("booking_confirmed".to_string()),
            data: None,
            locale: None,
            priority: Priority::Normal,
            action_url: None,
            delay: None,
        }
    }

    #[test]
    fn test_build_job() {
        let job = build_job(args()).unwrap();
        assert_eq!(job.required_channels, vec![Channel::Zalo]);
        assert!(job.data.is_null());
        assert!(job.scheduled_at.is_none());

        let body = serde_json::to_value(&job).unwrap();
        assert_eq!(body["templateId"], "booking_confirmed");
        assert_eq!(body["requiredChannels"][0], "zalo");
    }

    #[test]
    fn test_delay_schedules_job() {
        let mut with_delay = args();
        with_delay.delay = Some(1800);
        let job = build_job(with_delay).unwrap();

        let at = job.scheduled_at.unwrap();
        assert!(at > Utc::now() + Duration::minutes(29));
        assert!(at <= Utc::now() + Duration::minutes(30));
    }

    #[test]
    fn test_blank_audience_is_rejected() {
        let mut blank = args();
        blank.uid = Some("  ".to_string());
        assert!(build_job(blank).is_err());
    }
}
