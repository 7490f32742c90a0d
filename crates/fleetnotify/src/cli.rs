//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use fleetnotify_core::{Channel, Priority, DEFAULT_WORKER_BASE_URL};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetnotify")]
#[command(version, about = "Submit notification jobs and inspect their deliveries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Base URL of the fleetnotify daemon
    #[arg(long, env = "FLEETNOTIFY_URL", default_value = DEFAULT_WORKER_BASE_URL, global = true)]
    pub url: String,

    /// Shared secret for internal routes
    #[arg(long, env = "FLEETNOTIFY_INTERNAL_SECRET", hide_env_values = true, global = true)]
    pub secret: Option<String>,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check daemon health
    Ping,

    /// Submit a notification job
    Submit(SubmitArgs),

    /// Show a job and its deliveries
    Job {
        /// Job id
        id: String,
    },

    /// Issue a Zalo link code for a user
    LinkCode {
        /// User id the code binds to
        uid: String,
    },

    /// Load and validate the service configuration
    Config {
        /// Config file (defaults to FLEETNOTIFY_CONFIG or ~/.fleetnotify/config.toml)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Recipient user id
    #[arg(long, required_unless_present = "topic")]
    pub uid: Option<String>,

    /// FCM topic for broadcast jobs
    #[arg(long)]
    pub topic: Option<String>,

    /// Channel to use, repeatable (inapp, push, email, sms, zalo)
    #[arg(short, long = "channel", value_parser = parse_channel)]
    pub channels: Vec<Channel>,

    /// Title, used when no template is given
    #[arg(long, default_value = "")]
    pub title: String,

    /// Body, used when no template is given
    #[arg(long, default_value = "")]
    pub body: String,

    /// Template id
    #[arg(short, long)]
    pub template: Option<String>,

    /// Template data as a JSON object
    #[arg(long, value_parser = parse_data)]
    pub data: Option<serde_json::Value>,

    /// Locale override (e.g. vi, en)
    #[arg(long)]
    pub locale: Option<String>,

    /// Priority: low, normal or high (high ignores quiet hours)
    #[arg(long, default_value = "normal", value_parser = parse_priority)]
    pub priority: Priority,

    /// Deep link opened from the notification
    #[arg(long)]
    pub action_url: Option<String>,

    /// Delay delivery (e.g. "30m", "1h30m", "2d")
    #[arg(long, value_parser = parse_duration)]
    pub delay: Option<u64>,
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    s.parse().map_err(|e: fleetnotify_core::Error| e.to_string())
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|e: fleetnotify_core::Error| e.to_string())
}

fn parse_data(s: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(s).map_err(|e| format!("Invalid JSON: {}", e))?;
    if !value.is_object() {
        return Err("Template data must be a JSON object".to_string());
    }
    Ok(value)
}

/// Parse duration strings like "1h", "30m", "2d", "24h30m" into seconds
fn parse_duration(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err("Empty duration string".to_string());
    }

    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
        } else {
            if current_num.is_empty() {
                return Err(format!("Invalid duration format: {}", s));
            }
            let num: u64 = current_num
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", current_num))?;
            current_num.clear();

            let multiplier = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(format!("Unknown duration unit: {}", c)),
            };
            total_secs += num * multiplier;
        }
    }

    // Plain numbers are seconds
    if !current_num.is_empty() {
        let num: u64 = current_num
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", current_num))?;
        total_secs += num;
    }

    if total_secs == 0 {
        return Err("Duration must be greater than 0".to_string());
    }

    Ok(total_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30m").unwrap(), 1800);
        assert_eq!(parse_duration("1h30m").unwrap(), 5400);
        assert_eq!(parse_duration("1D").unwrap(), 86400);
        assert_eq!(parse_duration("90").unwrap(), 90);
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0h").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1x").is_err());
    }

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("push").unwrap(), Channel::Push);
        assert_eq!(parse_channel("in-app").unwrap(), Channel::InApp);
        assert!(parse_channel("fax").unwrap_err().contains("Invalid channel"));
    }

    #[test]
    fn test_parse_data_requires_object() {
        assert_eq!(parse_data(r#"{"booking":{"code":"BK-1"}}"#).unwrap()["booking"]["code"], "BK-1");
        assert!(parse_data("[1, 2]").is_err());
        assert!(parse_data("{oops").is_err());
    }

    #[test]
    fn test_submit_needs_uid_or_topic() {
        assert!(Cli::try_parse_from(["fleetnotify", "submit", "--title", "Hi"]).is_err());

        let cli = Cli::try_parse_from([
            "fleetnotify", "submit", "--topic", "promo", "-c", "push", "--priority", "high",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.topic.as_deref(), Some("promo"));
                assert_eq!(args.channels, vec![Channel::Push]);
                assert_eq!(args.priority, Priority::High);
            }
            _ => panic!("expected submit"),
        }
    }
}
