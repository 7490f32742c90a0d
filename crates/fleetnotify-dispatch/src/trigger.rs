//! Job trigger - runs the orchestrator once for every newly created job

use chrono::Utc;
use fleetnotify_core::{JobStatus, Result, TRIGGER_BATCH_SIZE};
use fleetnotify_db::Database;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::orchestrator::Orchestrator;

/// Claims due, untriggered jobs and fans them out.
///
/// Woken by [`JobTrigger::notifier`] when a job is created, and by a poll
/// interval for scheduled jobs coming due.
pub struct JobTrigger {
    db: Database,
    orchestrator: Orchestrator,
    notify: Arc<Notify>,
    interval: Duration,
}

impl JobTrigger {
    pub fn new(db: Database, orchestrator: Orchestrator, interval: Duration) -> Self {
        Self {
            db,
            orchestrator,
            notify: Arc::new(Notify::new()),
            interval,
        }
    }

    /// Handle used by job intake to wake the trigger
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Claim one batch and process it. Returns the number of jobs claimed.
    pub async fn trigger_once(&self) -> Result<usize> {
        let jobs = self
            .db
            .jobs()
            .claim_untriggered(Utc::now(), TRIGGER_BATCH_SIZE)
            .await?;

        for job in &jobs {
            if let Err(e) = self.orchestrator.run(job).await {
                error!(job_id = %job.id, error = %e, "Orchestrator failed");
                // Claimed jobs are never claimed again; record why this one stopped
                let reason = e.to_string();
                if let Err(e) = self
                    .db
                    .jobs()
                    .advance_status(&job.id, JobStatus::Failed, Some(&reason))
                    .await
                {
                    error!(job_id = %job.id, error = %e, "Failed to mark job failed");
                }
            }
        }
        Ok(jobs.len())
    }

    /// Run until the task is dropped
    pub async fn run(&self) {
        info!("Job trigger running (poll every {:?})", self.interval);
        loop {
            loop {
                match self.trigger_once().await {
                    Ok(n) if n as i64 >= TRIGGER_BATCH_SIZE => continue,
                    Ok(n) => {
                        if n > 0 {
                            debug!("Triggered {} jobs", n);
                        }
                        break;
                    }
                    Err(e) => {
                        error!("Failed to claim jobs: {}", e);
                        break;
                    }
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::recording::RecordingQueue;
    use crate::testing::setup_db;
    use fleetnotify_core::{Channel, NewJob, NotificationJob, UserPreferences};

    #[tokio::test]
    async fn test_each_job_triggers_once() {
        let (db, _dir) = setup_db().await;
        let mut prefs = UserPreferences::new("u1");
        prefs.contact.fcm_tokens = vec!["tok".to_string()];
        db.preferences().upsert(&prefs).await.unwrap();

        let job = NotificationJob::from_new(NewJob {
            uid: Some("u1".to_string()),
            required_channels: vec![Channel::Push],
            title: "Hi".to_string(),
            body: "There".to_string(),
            priority: fleetnotify_core::Priority::High,
            ..Default::default()
        });
        db.jobs().insert(&job).await.unwrap();

        let queue = Arc::new(RecordingQueue::default());
        let trigger = JobTrigger::new(
            db.clone(),
            Orchestrator::new(db.clone(), queue.clone()),
            Duration::from_secs(5),
        );

        assert_eq!(trigger.trigger_once().await.unwrap(), 1);
        assert_eq!(trigger.trigger_once().await.unwrap(), 0);
        assert_eq!(queue.tasks().await.len(), 1);

        let stored = db.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_orchestrator_error_fails_the_job() {
        let (db, _dir) = setup_db().await;
        let job = NotificationJob::from_new(NewJob {
            uid: Some("u1".to_string()),
            required_channels: vec![Channel::Push],
            title: "Hi".to_string(),
            body: "There".to_string(),
            ..Default::default()
        });
        db.jobs().insert(&job).await.unwrap();

        let queue = Arc::new(RecordingQueue::default());
        let trigger = JobTrigger::new(
            db.clone(),
            Orchestrator::new(db.clone(), queue.clone()),
            Duration::from_secs(5),
        );

        // Preferences become unreadable while the job runs
        sqlx::query("ALTER TABLE preferences RENAME TO preferences_offline")
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(trigger.trigger_once().await.unwrap(), 1);
        sqlx::query("ALTER TABLE preferences_offline RENAME TO preferences")
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(trigger.trigger_once().await.unwrap(), 0);

        let stored = db.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.last_error.unwrap().contains("Database error"));
        assert_eq!(stored.attempts, 1);
        assert!(queue.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_notifier_wakes_run_loop() {
        let (db, _dir) = setup_db().await;
        let queue = Arc::new(RecordingQueue::default());
        let trigger = Arc::new(JobTrigger::new(
            db.clone(),
            Orchestrator::new(db.clone(), queue.clone()),
            Duration::from_secs(3600),
        ));
        let notify = trigger.notifier();

        let runner = trigger.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        let job = NotificationJob::from_new(NewJob {
            topic: Some("promo".to_string()),
            title: "Deal".to_string(),
            body: "Now".to_string(),
            ..Default::default()
        });
        db.jobs().insert(&job).await.unwrap();
        notify.notify_one();

        let mut claimed = false;
        for _ in 0..50 {
            if !queue.tasks().await.is_empty() {
                claimed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(claimed);
    }
}
