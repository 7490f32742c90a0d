//! Wiring of the database, providers, workers and trigger

use anyhow::{Context, Result};
use fleetnotify_core::ServiceConfig;
use fleetnotify_db::Database;
use fleetnotify_dispatch::{ChannelWorker, DbTokenStore, HttpDispatchQueue, JobTrigger, Orchestrator};
use fleetnotify_providers::Providers;
use fleetnotify_web::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Daemon {
    config: ServiceConfig,
    db: Database,
    state: AppState,
    trigger: JobTrigger,
}

impl Daemon {
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let db = Database::new(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?;
        info!("Database initialized at {}", config.db_path.display());

        let tokens = Arc::new(DbTokenStore::new(db.clone()));
        let providers = Providers::from_config(&config, tokens)?;
        let provider_timeout = Duration::from_secs(config.provider_timeout_secs);
        let worker = ChannelWorker::new(db.clone(), providers, provider_timeout);

        // Fan-out posts back to this service's own worker routes
        let client = reqwest::Client::builder().timeout(provider_timeout).build()?;
        let queue = Arc::new(HttpDispatchQueue::new(
            client,
            config.worker_base_url.clone(),
            config.internal_secret.clone(),
        ));
        info!("Dispatching worker tasks to {}", config.worker_base_url);

        let orchestrator = Orchestrator::new(db.clone(), queue);
        let trigger = JobTrigger::new(
            db.clone(),
            orchestrator,
            Duration::from_secs(config.trigger_interval_secs),
        );
        let state = AppState::new(&config, db.clone(), worker, trigger.notifier());

        Ok(Self {
            config,
            db,
            state,
            trigger,
        })
    }

    /// Serve HTTP and run the trigger loop until either stops
    pub async fn run(&self) -> Result<()> {
        tokio::select! {
            result = fleetnotify_web::start_server(&self.config, self.state.clone()) => {
                result.with_context(|| format!("serving on {}", self.config.bind_addr))?;
            }
            _ = self.trigger.run() => {}
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.db.close().await;
    }
}
