//! Webhook linker - binds a Zalo user to an account from a link code
//!
//! The Zalo webhook is acknowledged with 200 once its signature checks out,
//! whatever happens afterwards, so the platform does not redeliver it. Only a
//! bad signature (401) or an unparseable body (400) is reported otherwise.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use fleetnotify_core::{Error, LinkCode, Result, ServiceConfig, LINK_CODE_LEN};
use fleetnotify_db::Database;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

static LINK_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blink[\s_-]+([a-z0-9]{4,12})\b").expect("link code pattern is valid")
});

/// What the webhook handler should answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Signature missing or wrong
    Unauthorized,
    /// Body is not JSON
    Malformed(String),
    /// No Zalo user id or no code in the message
    Ignored,
    Linked { uid: String, zalo_user_id: String },
    /// Code rejected or the transaction failed
    Rejected { reason: String },
}

pub struct Linker {
    db: Database,
    app_secret: Option<String>,
    bypass_signature: bool,
}

impl Linker {
    pub fn new(db: Database, config: &ServiceConfig) -> Self {
        if config.signature_bypass_enabled() {
            warn!("Zalo webhook signature verification is DISABLED");
        }
        Self {
            db,
            app_secret: config.zalo.app_secret.clone().filter(|s| !s.is_empty()),
            bypass_signature: config.signature_bypass_enabled(),
        }
    }

    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> LinkOutcome {
        if !self.bypass_signature {
            let verified = match (self.app_secret.as_deref(), signature) {
                (Some(secret), Some(signature)) => verify_signature(secret, body, signature),
                _ => false,
            };
            if !verified {
                warn!("Rejected Zalo webhook with invalid signature");
                return LinkOutcome::Unauthorized;
            }
        }

        let event: Value = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => return LinkOutcome::Malformed(e.to_string()),
        };

        let zalo_user_id = event
            .pointer("/sender/id")
            .or_else(|| event.get("user_id_by_app"))
            .and_then(json_id);
        let code = event
            .pointer("/message/text")
            .and_then(Value::as_str)
            .and_then(extract_code);

        let (zalo_user_id, code) = match (zalo_user_id, code) {
            (Some(id), Some(code)) => (id, code),
            _ => {
                debug!("Webhook event carries no link request");
                return LinkOutcome::Ignored;
            }
        };

        match self.db.link_codes().consume(&code, &zalo_user_id, Utc::now()).await {
            Ok(Ok(uid)) => {
                info!(uid = %uid, "Linked Zalo user");
                LinkOutcome::Linked { uid, zalo_user_id }
            }
            Ok(Err(failure)) => {
                info!(code = %code, reason = %failure, "Link code rejected");
                LinkOutcome::Rejected {
                    reason: failure.as_str().to_string(),
                }
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Link transaction failed");
                LinkOutcome::Rejected {
                    reason: "TRANSACTION_FAILED".to_string(),
                }
            }
        }
    }
}

/// Ids arrive as strings, occasionally as numbers
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// HMAC-SHA256 of `body`, given as hex or base64
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    let decoded = hex::decode(signature)
        .ok()
        .or_else(|| base64::engine::general_purpose::STANDARD.decode(signature).ok());
    match decoded {
        Some(bytes) => mac.verify_slice(&bytes).is_ok(),
        None => false,
    }
}

/// Find a link code in free text: `link-ab12`, `Link AB12`, `LINK_AB12`
pub fn extract_code(text: &str) -> Option<String> {
    LINK_CODE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// Issue a fresh code for `uid`, valid for `ttl`
pub async fn issue_link_code(db: &Database, uid: &str, ttl: Duration, now: DateTime<Utc>) -> Result<LinkCode> {
    if uid.trim().is_empty() {
        return Err(Error::invalid("uid is required"));
    }

    let repo = db.link_codes();
    let mut last_error = None;
    for _ in 0..3 {
        let code = LinkCode {
            code: generate_code(),
            uid: uid.to_string(),
            used: false,
            expires_at_ms: (now + ttl).timestamp_millis(),
            zalo_user_id: None,
            used_at: None,
        };
        // A primary key clash means the random code is taken; draw again
        match repo.insert(&code).await {
            Ok(()) => {
                info!(uid = %uid, "Issued link code");
                return Ok(code);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| Error::db("could not issue link code")))
}

fn generate_code() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(LINK_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_db;
    use fleetnotify_core::Environment;
    use serde_json::json;

    const SECRET: &str = "zalo-app-secret";

    fn config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.zalo.app_secret = Some(SECRET.to_string());
        config
    }

    fn sign_hex(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn sign_base64(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn event(sender: &str, text: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event_name": "user_send_text",
            "sender": { "id": sender },
            "message": { "text": text },
        }))
        .unwrap()
    }

    async fn seed_code(db: &Database, code: &str, uid: &str) {
        db.link_codes()
            .insert(&LinkCode {
                code: code.to_string(),
                uid: uid.to_string(),
                used: false,
                expires_at_ms: (Utc::now() + Duration::minutes(10)).timestamp_millis(),
                zalo_user_id: None,
                used_at: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_signature_hex_and_base64() {
        let body = br#"{"hello":"world"}"#;
        assert!(verify_signature(SECRET, body, &sign_hex(body)));
        assert!(verify_signature(SECRET, body, &sign_base64(body)));
        assert!(verify_signature(SECRET, body, &format!("sha256={}", sign_hex(body))));
        assert!(!verify_signature(SECRET, b"tampered", &sign_hex(body)));
        assert!(!verify_signature("other", body, &sign_hex(body)));
        assert!(!verify_signature(SECRET, body, "not a signature!"));
    }

    #[test]
    fn test_extract_code_variants() {
        assert_eq!(extract_code("link-ab12cd").as_deref(), Some("AB12CD"));
        assert_eq!(extract_code("Xin chao, Link AB12CD nhe").as_deref(), Some("AB12CD"));
        assert_eq!(extract_code("LINK_ab12cd").as_deref(), Some("AB12CD"));
        assert_eq!(extract_code("hello there"), None);
        assert_eq!(extract_code("linked up"), None);
    }

    #[test]
    fn test_extract_code_needs_word_boundary_before_link() {
        // Punctuation and line breaks separate words
        assert_eq!(extract_code("(link-AB12)").as_deref(), Some("AB12"));
        assert_eq!(extract_code("ma so:\nlink AB12").as_deref(), Some("AB12"));
        // Letters glued in front, ASCII or not, hide the keyword
        assert_eq!(extract_code("xlink AB12"), None);
        assert_eq!(extract_code("mãlink-AB12"), None);
        // Codes are 4 to 12 characters
        assert_eq!(extract_code("link-AB1"), None);
        assert_eq!(extract_code("link-AB12CD34EF56GH"), None);
    }

    #[tokio::test]
    async fn test_bad_signature_is_unauthorized() {
        let (db, _dir) = setup_db().await;
        let linker = Linker::new(db, &config());
        let body = event("zalo-1", "link-ABC123");

        assert_eq!(linker.handle(&body, Some("deadbeef")).await, LinkOutcome::Unauthorized);
        assert_eq!(linker.handle(&body, None).await, LinkOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn test_malformed_json_after_signature() {
        let (db, _dir) = setup_db().await;
        let linker = Linker::new(db, &config());
        let body = b"{not json";

        assert_eq!(linker.handle(body, None).await, LinkOutcome::Unauthorized);
        assert!(matches!(
            linker.handle(body, Some(&sign_hex(body))).await,
            LinkOutcome::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_link_success_then_used() {
        let (db, _dir) = setup_db().await;
        seed_code(&db, "ABC123", "u1").await;
        let linker = Linker::new(db.clone(), &config());

        let body = event("zalo-1", "link-abc123");
        assert_eq!(
            linker.handle(&body, Some(&sign_base64(&body))).await,
            LinkOutcome::Linked {
                uid: "u1".to_string(),
                zalo_user_id: "zalo-1".to_string()
            }
        );
        let prefs = db.preferences().get("u1").await.unwrap().unwrap();
        assert_eq!(prefs.contact.zalo_user_id.as_deref(), Some("zalo-1"));

        let again = event("zalo-2", "LINK ABC123");
        assert_eq!(
            linker.handle(&again, Some(&sign_hex(&again))).await,
            LinkOutcome::Rejected {
                reason: "CODE_USED".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_webhooks_link_once() {
        let (db, _dir) = setup_db().await;
        seed_code(&db, "RACE01", "u1").await;
        let linker = Linker::new(db.clone(), &config());

        let body = event("zalo-1", "link-race01");
        let signature = sign_hex(&body);
        let (a, b) = tokio::join!(
            linker.handle(&body, Some(&signature)),
            linker.handle(&body, Some(&signature))
        );

        let linked = [&a, &b]
            .iter()
            .filter(|o| matches!(o, LinkOutcome::Linked { .. }))
            .count();
        assert_eq!(linked, 1);
        assert!([&a, &b].contains(&&LinkOutcome::Rejected {
            reason: "CODE_USED".to_string()
        }));
    }

    #[tokio::test]
    async fn test_missing_sender_or_code_is_ignored() {
        let (db, _dir) = setup_db().await;
        let linker = Linker::new(db, &config());

        let no_code = event("zalo-1", "xin chao");
        assert_eq!(linker.handle(&no_code, Some(&sign_hex(&no_code))).await, LinkOutcome::Ignored);

        let no_sender = serde_json::to_vec(&json!({ "message": { "text": "link-ABC123" } })).unwrap();
        assert_eq!(
            linker.handle(&no_sender, Some(&sign_hex(&no_sender))).await,
            LinkOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_unknown_code_is_rejected() {
        let (db, _dir) = setup_db().await;
        let linker = Linker::new(db, &config());
        let body = event("zalo-1", "link-ZZZZ99");
        assert_eq!(
            linker.handle(&body, Some(&sign_hex(&body))).await,
            LinkOutcome::Rejected {
                reason: "INVALID_CODE".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_bypass_only_outside_production() {
        let (db, _dir) = setup_db().await;
        let mut dev = config();
        dev.zalo.skip_signature = true;
        let body = event("zalo-1", "hello");
        assert_eq!(Linker::new(db.clone(), &dev).handle(&body, None).await, LinkOutcome::Ignored);

        let mut prod = dev.clone();
        prod.environment = Environment::Production;
        assert_eq!(
            Linker::new(db, &prod).handle(&body, None).await,
            LinkOutcome::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_issue_link_code() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let code = issue_link_code(&db, "u1", Duration::minutes(10), now).await.unwrap();

        assert_eq!(code.code.len(), LINK_CODE_LEN);
        assert!(code.code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(code.expires_at_ms, (now + Duration::minutes(10)).timestamp_millis());
        assert!(db.link_codes().get(&code.code).await.unwrap().is_some());

        assert!(issue_link_code(&db, " ", Duration::minutes(10), now).await.is_err());
    }
}
