//! Database schema for fleetnotify

/// SQLite schema initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    uid TEXT,
    required_channels TEXT NOT NULL DEFAULT '[]',
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    action_url TEXT,
    topic TEXT,
    template_id TEXT,
    data TEXT NOT NULL DEFAULT '{}',
    locale TEXT,
    priority TEXT NOT NULL DEFAULT 'normal',
    scheduled_at TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    triggered_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_untriggered ON jobs(triggered_at, scheduled_at);

CREATE TABLE IF NOT EXISTS templates (
    id TEXT PRIMARY KEY,
    channels TEXT NOT NULL DEFAULT '[]',
    locales TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deliveries (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    uid TEXT,
    channel TEXT NOT NULL,
    provider TEXT NOT NULL,
    status TEXT NOT NULL,
    provider_message_id TEXT,
    error_code TEXT,
    error_message TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    sent_at TEXT,
    delivered_at TEXT,
    read_at TEXT,
    meta TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_deliveries_job_id ON deliveries(job_id);
CREATE INDEX IF NOT EXISTS idx_deliveries_status ON deliveries(status);

CREATE TABLE IF NOT EXISTS preferences (
    uid TEXT PRIMARY KEY,
    channels TEXT NOT NULL DEFAULT '{}',
    quiet_hours TEXT,
    contact TEXT NOT NULL DEFAULT '{}',
    locale TEXT,
    timezone TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS link_codes (
    code TEXT PRIMARY KEY,
    uid TEXT NOT NULL,
    used INTEGER NOT NULL DEFAULT 0,
    expires_at_ms INTEGER NOT NULL,
    zalo_user_id TEXT,
    used_at TEXT
);

CREATE TABLE IF NOT EXISTS oa_token (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    refreshed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inbox (
    id TEXT PRIMARY KEY,
    uid TEXT NOT NULL,
    job_id TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    action_url TEXT,
    read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inbox_uid ON inbox(uid, created_at);
"#;
