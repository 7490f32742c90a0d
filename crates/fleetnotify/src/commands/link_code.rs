//! Link-code command implementation

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::client::ApiClient;
use crate::output::{format_time, is_json_mode, print_info, print_json, print_success};

pub async fn execute(client: &ApiClient, uid: &str) -> Result<()> {
    let reply = client.post("/link-codes", &json!({ "uid": uid })).await?;

    if is_json_mode() {
        print_json(&reply);
        return Ok(());
    }

    let code = reply["code"].as_str().context("daemon reply has no code")?;
    print_success(&format!("Link code for {}: {}", uid, code));
    if let Some(expires) = reply["expiresAtMs"]
        .as_i64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    {
        print_info(&format!("Valid until {}", format_time(&expires)));
    }
    print_info(&format!("Send \"link-{}\" to the Zalo Official Account", code));
    Ok(())
}
