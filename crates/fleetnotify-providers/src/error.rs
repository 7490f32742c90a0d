//! Error types for the provider adapters

use fleetnotify_core::ProviderResult;

/// Provider error type
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Token store error: {0}")]
    TokenStore(String),

    #[error("Provider not configured")]
    NotConfigured,
}

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn api<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        ProviderError::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn token_store<S: Into<String>>(msg: S) -> Self {
        ProviderError::TokenStore(msg.into())
    }

    /// Stable error code recorded on the delivery
    pub fn code(&self) -> String {
        match self {
            ProviderError::HttpError(e) if e.is_timeout() => "TIMEOUT".to_string(),
            ProviderError::HttpError(_) => "NETWORK_ERROR".to_string(),
            ProviderError::Status { status, .. } => format!("HTTP_{}", status),
            ProviderError::Api { code, .. } => code.clone(),
            ProviderError::JsonError(_) => "INVALID_RESPONSE".to_string(),
            ProviderError::TokenStore(_) => "TOKEN_STORE_ERROR".to_string(),
            ProviderError::NotConfigured => "NOT_CONFIGURED".to_string(),
        }
    }

    /// Normalize into a failed attempt of `provider`
    pub fn into_result(self, provider: &str) -> ProviderResult {
        let message = match &self {
            ProviderError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ProviderResult::failed(provider, self.code(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetnotify_core::DeliveryStatus;

    #[test]
    fn test_error_codes() {
        let err = ProviderError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.code(), "HTTP_503");
        assert_eq!(ProviderError::NotConfigured.code(), "NOT_CONFIGURED");
        assert_eq!(ProviderError::api("-201", "bad user").code(), "-201");
    }

    #[test]
    fn test_into_result_keeps_api_message() {
        let result = ProviderError::api("-230", "user not interacted").into_result("zalo");
        assert_eq!(result.status, DeliveryStatus::Failed);
        assert_eq!(result.provider, "zalo");
        assert_eq!(result.error_code.as_deref(), Some("-230"));
        assert_eq!(result.error_message.as_deref(), Some("user not interacted"));
    }
}
