//! Ping command implementation

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{is_json_mode, print_error, print_json, print_success};

pub async fn execute(client: &ApiClient) -> Result<()> {
    match client.get("/health").await {
        Ok(body) => {
            if is_json_mode() {
                print_json(&body);
            } else {
                let version = body["version"].as_str().unwrap_or("unknown");
                print_success(&format!("Daemon is alive (version {})", version));
            }
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Daemon is not reachable: {:#}", e));
            Err(e)
        }
    }
}
