use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// OAuth 2.0 token information for one TikTok account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Access token for API requests
    pub access_token: String,
    /// Refresh token for getting new access tokens
    pub refresh_token: String,
    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiry time as Unix timestamp (seconds since epoch)
    pub expires_at: u64,
    /// Expiry of the refresh token, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<u64>,
    /// Scopes granted by the user
    #[serde(default)]
    pub scope: BTreeSet<String>,
    /// TikTok user identifier for this app
    #[serde(default)]
    pub open_id: String,
    /// When this record was obtained (Unix seconds)
    #[serde(default)]
    pub authenticated_at: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    /// True once `now` has reached `expires_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired(self, now)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.contains(scope)
    }
}

/// Check whether `record` can no longer be used at `now` (Unix seconds).
pub fn is_expired(record: &TokenRecord, now: u64) -> bool {
    now >= record.expires_at
}

/// TikTok reports granted scopes comma-separated; tolerate spaces too.
pub fn parse_scope(raw: &str) -> BTreeSet<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token endpoint response body.
///
/// The endpoint answers 200 with an `error` field on some failures, so every
/// field is optional here and validated by the caller.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_expires_in: Option<u64>,
    pub open_id: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: u64) -> TokenRecord {
        TokenRecord {
            access_token: "act.1".to_string(),
            refresh_token: "rft.1".to_string(),
            token_type: "Bearer".to_string(),
            expires_at,
            refresh_expires_at: None,
            scope: parse_scope("user.info.basic,video.upload"),
            open_id: "open-1".to_string(),
            authenticated_at: 0,
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let r = record(1_000);
        assert!(!is_expired(&r, 0));
        assert!(!is_expired(&r, 999));
        assert!(is_expired(&r, 1_000));
        assert!(is_expired(&r, 1_001));
        assert_eq!(r.is_expired(999), is_expired(&r, 999));
    }

    #[test]
    fn scope_parsing_accepts_commas_and_spaces() {
        let scope = parse_scope("user.info.basic, video.publish,video.upload,,");
        assert_eq!(scope.len(), 3);
        assert!(scope.contains("video.publish"));
        assert!(parse_scope("").is_empty());
    }

    #[test]
    fn older_records_without_optional_fields_still_parse() {
        let json = r#"{"access_token":"a","refresh_token":"r","expires_at":42}"#;
        let r: TokenRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.token_type, "Bearer");
        assert!(r.scope.is_empty());
        assert_eq!(r.refresh_expires_at, None);
        assert!(!r.has_scope("video.upload"));
    }
}
