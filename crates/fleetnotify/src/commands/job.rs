//! Job command implementation

use anyhow::{Context, Result};
use fleetnotify_core::{Delivery, NotificationJob};
use serde_json::json;

use crate::client::ApiClient;
use crate::output::{is_json_mode, print_deliveries, print_job, print_json};

pub async fn execute(client: &ApiClient, id: &str) -> Result<()> {
    let job_reply = client.get(&format!("/jobs/{}", id)).await?;
    let deliveries_reply = client.get(&format!("/jobs/{}/deliveries", id)).await?;

    if is_json_mode() {
        print_json(&json!({
            "job": job_reply["job"],
            "deliveries": deliveries_reply["deliveries"],
        }));
        return Ok(());
    }

    let job: NotificationJob =
        serde_json::from_value(job_reply["job"].clone()).context("malformed job in daemon reply")?;
    let deliveries: Vec<Delivery> = serde_json::from_value(deliveries_reply["deliveries"].clone())
        .context("malformed deliveries in daemon reply")?;

    print_job(&job);
    println!();
    print_deliveries(&deliveries);
    Ok(())
}
