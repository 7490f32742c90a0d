//! Service configuration
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables, so a deployment can run from env alone.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::*;
use crate::error::{Error, Result};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(Error::config(format!("Invalid environment: {}", s))),
        }
    }
}

/// Zalo Official Account settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZaloConfig {
    /// Secret used to verify webhook signatures
    pub app_secret: Option<String>,
    /// Skip webhook signature checks (ignored in production)
    pub skip_signature: bool,
    pub app_id: Option<String>,
    /// OAuth secret key used when refreshing the OA token
    pub secret_key: Option<String>,
    /// Fallback access token when the token store is empty
    pub oa_access_token: Option<String>,
    pub oa_refresh_token: Option<String>,
}

/// Firebase Cloud Messaging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    /// OAuth bearer token for the FCM HTTP v1 API
    pub access_token: String,
}

/// HTTP mail API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// HTTP SMS gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender: Option<String>,
}

/// Full service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// Shared secret between the orchestrator and the channel workers
    pub internal_secret: Option<String>,
    /// Base URL the dispatch queue posts worker requests to
    pub worker_base_url: String,
    /// Short-circuit network providers with synthetic successes
    pub emulator: bool,
    pub provider_timeout_secs: u64,
    pub trigger_interval_secs: u64,
    pub link_code_ttl_secs: u64,
    pub cors_origin: Option<String>,
    pub zalo: ZaloConfig,
    pub fcm: Option<FcmConfig>,
    pub email: Option<EmailConfig>,
    pub sms: Option<SmsConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_path: db_path(),
            internal_secret: None,
            worker_base_url: DEFAULT_WORKER_BASE_URL.to_string(),
            emulator: false,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            trigger_interval_secs: DEFAULT_TRIGGER_INTERVAL_SECS,
            link_code_ttl_secs: DEFAULT_LINK_CODE_TTL_SECS,
            cors_origin: None,
            zalo: ZaloConfig::default(),
            fcm: None,
            email: None,
            sms: None,
        }
    }
}

impl ServiceConfig {
    /// Load from `FLEETNOTIFY_CONFIG` or the default path, then apply the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_path());
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Override fields from environment-style lookups
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(env) = get("FLEETNOTIFY_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(addr) = get("FLEETNOTIFY_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = get("FLEETNOTIFY_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(secret) = get("FLEETNOTIFY_INTERNAL_SECRET") {
            self.internal_secret = Some(secret);
        }
        if let Some(url) = get("FLEETNOTIFY_WORKER_BASE_URL") {
            self.worker_base_url = url;
        }
        if let Some(flag) = get("FLEETNOTIFY_EMULATOR") {
            self.emulator = parse_flag(&flag);
        }
        if let Some(secs) = get("FLEETNOTIFY_PROVIDER_TIMEOUT_SECS") {
            self.provider_timeout_secs = parse_number("FLEETNOTIFY_PROVIDER_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = get("FLEETNOTIFY_TRIGGER_INTERVAL_SECS") {
            self.trigger_interval_secs = parse_number("FLEETNOTIFY_TRIGGER_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = get("FLEETNOTIFY_LINK_CODE_TTL_SECS") {
            self.link_code_ttl_secs = parse_number("FLEETNOTIFY_LINK_CODE_TTL_SECS", &secs)?;
        }
        if let Some(origin) = get("FLEETNOTIFY_CORS_ORIGIN") {
            self.cors_origin = Some(origin);
        }

        if let Some(secret) = get("ZALO_APP_SECRET") {
            self.zalo.app_secret = Some(secret);
        }
        if let Some(flag) = get("ZALO_SKIP_SIGNATURE") {
            self.zalo.skip_signature = parse_flag(&flag);
        }
        if let Some(id) = get("ZALO_APP_ID") {
            self.zalo.app_id = Some(id);
        }
        if let Some(key) = get("ZALO_SECRET_KEY") {
            self.zalo.secret_key = Some(key);
        }
        if let Some(token) = get("ZALO_OA_ACCESS_TOKEN") {
            self.zalo.oa_access_token = Some(token);
        }
        if let Some(token) = get("ZALO_OA_REFRESH_TOKEN") {
            self.zalo.oa_refresh_token = Some(token);
        }

        if let (Some(project_id), Some(access_token)) = (get("FCM_PROJECT_ID"), get("FCM_ACCESS_TOKEN")) {
            self.fcm = Some(FcmConfig {
                project_id,
                access_token,
            });
        }
        if let (Some(api_url), Some(api_key)) = (get("EMAIL_API_URL"), get("EMAIL_API_KEY")) {
            self.email = Some(EmailConfig {
                api_url,
                api_key,
                from: get("EMAIL_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            });
        }
        if let (Some(api_url), Some(api_key)) = (get("SMS_API_URL"), get("SMS_API_KEY")) {
            self.sms = Some(SmsConfig {
                api_url,
                api_key,
                sender: get("SMS_SENDER"),
            });
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// The signature bypass only takes effect outside production
    pub fn signature_bypass_enabled(&self) -> bool {
        self.zalo.skip_signature && !self.is_production()
    }

    /// Reject configurations that are unsafe to run
    pub fn validate(&self) -> Result<()> {
        if self.provider_timeout_secs == 0 || self.provider_timeout_secs > DEFAULT_PROVIDER_TIMEOUT_SECS {
            return Err(Error::config(format!(
                "provider_timeout_secs must be between 1 and {}",
                DEFAULT_PROVIDER_TIMEOUT_SECS
            )));
        }
        if self.trigger_interval_secs == 0 {
            return Err(Error::config("trigger_interval_secs must be positive"));
        }
        if self.is_production() {
            if self.zalo.skip_signature {
                return Err(Error::config("zalo.skip_signature is not allowed in production"));
            }
            if self.emulator {
                return Err(Error::config("emulator mode is not allowed in production"));
            }
            if self.internal_secret.as_deref().map_or(true, str::is_empty) {
                return Err(Error::config("internal_secret is required in production"));
            }
            if self.zalo.app_secret.as_deref().map_or(true, str::is_empty) {
                return Err(Error::config("zalo.app_secret is required in production"));
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.provider_timeout_secs, 30);
        assert!(config.internal_secret.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_config() {
        let config = ServiceConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(config.fcm.is_none());
    }

    #[test]
    fn test_load_config_file() {
        let content = r#"
environment = "production"
internal_secret = "s3cret"
worker_base_url = "http://workers:8787"

[zalo]
app_secret = "zsecret"
oa_access_token = "fallback"

[email]
api_url = "https://mail.example.com/send"
api_key = "k"
from = "ops@example.com"
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let config = ServiceConfig::load_from(file.path()).unwrap();
        assert!(config.is_production());
        assert_eq!(config.internal_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.worker_base_url, "http://workers:8787");
        assert_eq!(config.zalo.oa_access_token.as_deref(), Some("fallback"));
        assert_eq!(config.email.unwrap().from, "ops@example.com");
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(env(&[
                ("FLEETNOTIFY_INTERNAL_SECRET", "abc"),
                ("FLEETNOTIFY_EMULATOR", "true"),
                ("ZALO_APP_SECRET", "zs"),
                ("FCM_PROJECT_ID", "fleet-prod"),
                ("FCM_ACCESS_TOKEN", "ya29"),
                ("SMS_API_URL", "https://sms.example.com"),
            ]))
            .unwrap();

        assert_eq!(config.internal_secret.as_deref(), Some("abc"));
        assert!(config.emulator);
        assert_eq!(config.zalo.app_secret.as_deref(), Some("zs"));
        assert_eq!(config.fcm.unwrap().project_id, "fleet-prod");
        // SMS needs both url and key
        assert!(config.sms.is_none());
    }

    #[test]
    fn test_env_rejects_bad_number() {
        let mut config = ServiceConfig::default();
        let result = config.apply_env(env(&[("FLEETNOTIFY_PROVIDER_TIMEOUT_SECS", "soon")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_bypass_gated_by_environment() {
        let mut config = ServiceConfig::default();
        config.zalo.skip_signature = true;
        assert!(config.signature_bypass_enabled());

        config.environment = Environment::Production;
        assert!(!config.signature_bypass_enabled());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_requires_secrets() {
        let mut config = ServiceConfig {
            environment: Environment::Production,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.internal_secret = Some("s".to_string());
        config.zalo.app_secret = Some("z".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let config = ServiceConfig {
            provider_timeout_secs: 120,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
