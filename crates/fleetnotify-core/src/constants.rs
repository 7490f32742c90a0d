//! Constants and default values for fleetnotify

use std::path::PathBuf;

use crate::types::Channel;

/// Default fleetnotify home directory name
pub const FLEETNOTIFY_DIR: &str = ".fleetnotify";

/// Default database file name
pub const DB_FILE: &str = "fleetnotify.db";

/// Default config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "FLEETNOTIFY_CONFIG";

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8787";

/// Default base URL the orchestrator uses to reach the channel workers
pub const DEFAULT_WORKER_BASE_URL: &str = "http://127.0.0.1:8787";

/// Locale used when the recipient's locale has no template text
pub const FALLBACK_LOCALE: &str = "vi";

/// Timezone used for quiet hours when the recipient has none
pub const DEFAULT_TIMEZONE: &str = "Asia/Ho_Chi_Minh";

/// Channels used when neither the job nor the template names any
pub const DEFAULT_CHANNELS: &[Channel] = &[Channel::InApp, Channel::Push];

/// Upper bound for a single outbound provider call
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Link codes expire after this many seconds
pub const DEFAULT_LINK_CODE_TTL_SECS: u64 = 600;

/// Length of a generated link code
pub const LINK_CODE_LEN: usize = 6;

/// How often the job trigger looks for untriggered jobs
pub const DEFAULT_TRIGGER_INTERVAL_SECS: u64 = 5;

/// Max jobs claimed per trigger pass
pub const TRIGGER_BATCH_SIZE: i64 = 50;

/// Header carrying the shared secret between orchestrator and workers
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Header carrying the Zalo webhook signature
pub const ZALO_SIGNATURE_HEADER: &str = "x-zalo-signature";

/// Zalo OA error codes that mean the access token must be refreshed
pub const ZALO_INVALID_TOKEN_CODES: &[i64] = &[-216, -124];

/// Zalo OA customer-service message endpoint
pub const ZALO_MESSAGE_URL: &str = "https://openapi.zalo.me/v3.0/oa/message/cs";

/// Zalo OAuth token endpoint
pub const ZALO_OAUTH_URL: &str = "https://oauth.zaloapp.com/v4/oa/access_token";

/// FCM HTTP v1 API base
pub const FCM_API_BASE: &str = "https://fcm.googleapis.com/v1";

/// Get the fleetnotify home directory
pub fn fleetnotify_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(FLEETNOTIFY_DIR))
        .unwrap_or_else(|| PathBuf::from(FLEETNOTIFY_DIR))
}

/// Get the default database path
pub fn db_path() -> PathBuf {
    fleetnotify_home().join(DB_FILE)
}

/// Get the default config path
pub fn config_path() -> PathBuf {
    fleetnotify_home().join(CONFIG_FILE)
}
