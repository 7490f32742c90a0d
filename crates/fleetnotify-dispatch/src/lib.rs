//! fleetnotify dispatch - the notification fan-out pipeline
//!
//! - [`Orchestrator`]: turns a job into rendered, per-channel dispatch tasks
//! - [`DispatchQueue`]: hands tasks to the channel workers
//! - [`ChannelWorker`]: calls a provider and records the delivery
//! - [`Linker`]: binds Zalo users to accounts from webhook link codes
//! - [`JobTrigger`]: claims newly created jobs and runs the orchestrator

pub mod linker;
pub mod orchestrator;
pub mod queue;
pub mod token_store;
pub mod trigger;
pub mod worker;

pub use linker::{issue_link_code, LinkOutcome, Linker};
pub use orchestrator::{FanOut, Orchestrator};
pub use queue::{DispatchQueue, DispatchTask, HttpDispatchQueue};
pub use token_store::DbTokenStore;
pub use trigger::JobTrigger;
pub use worker::{ChannelWorker, WorkerRequest, WorkerResponse};

#[cfg(test)]
pub(crate) mod testing {
    use fleetnotify_db::Database;
    use tempfile::{tempdir, TempDir};

    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        (db, dir)
    }
}
