//! Config command implementation

use anyhow::Result;
use colored::Colorize;
use fleetnotify_core::ServiceConfig;
use serde_json::json;
use std::path::Path;

use crate::output::{is_json_mode, print_error, print_json, print_success};

fn configured(present: bool) -> String {
    if present {
        "configured".green().to_string()
    } else {
        "not configured".dimmed().to_string()
    }
}

pub fn load(file: Option<&Path>) -> Result<ServiceConfig> {
    let config = match file {
        Some(path) => {
            let mut config = ServiceConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => ServiceConfig::load()?,
    };
    Ok(config)
}

pub fn execute(file: Option<&Path>) -> Result<()> {
    let config = load(file)?;
    if let Err(e) = config.validate() {
        print_error(&e.to_string());
        return Err(e.into());
    }

    if is_json_mode() {
        print_json(&json!({
            "environment": config.environment,
            "bindAddr": config.bind_addr,
            "dbPath": config.db_path,
            "workerBaseUrl": config.worker_base_url,
            "emulator": config.emulator,
            "signatureBypass": config.signature_bypass_enabled(),
            "providers": {
                "fcm": config.fcm.is_some(),
                "email": config.email.is_some(),
                "sms": config.sms.is_some(),
                "zalo": config.zalo.oa_access_token.is_some(),
            },
        }));
        return Ok(());
    }

    print_success("Configuration is valid");
    println!("  {:<16} {:?}", "environment", config.environment);
    println!("  {:<16} {}", "bind", config.bind_addr);
    println!("  {:<16} {}", "database", config.db_path.display());
    println!("  {:<16} {}", "workers", config.worker_base_url);
    println!("  {:<16} {}", "internal secret", configured(config.internal_secret.is_some()));
    println!("  {:<16} {}", "zalo app secret", configured(config.zalo.app_secret.is_some()));
    println!("  {:<16} {}", "fcm", configured(config.fcm.is_some()));
    println!("  {:<16} {}", "email", configured(config.email.is_some()));
    println!("  {:<16} {}", "sms", configured(config.sms.is_some()));
    if config.emulator {
        println!("  {:<16} {}", "emulator", "on".yellow());
    }
    if config.signature_bypass_enabled() {
        println!("  {:<16} {}", "signatures", "NOT VERIFIED".yellow().bold());
    }
    Ok(())
}
