//! OAuth2 session state and its transition rules

use serde::{Deserialize, Serialize};

use super::tokens::TokenResponse;

/// Expire the session this many seconds before the provider does.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 5 * 60;

/// Expiry used for tokens issued without a lifetime (VK "offline" scope).
pub const NEVER_EXPIRES: i64 = i64::MAX;

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Stored OAuth2 credentials.
///
/// Invariant: `access_token.is_some()` implies `expires_at.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<i64>,
    /// Unix seconds, already reduced by the safety margin.
    pub expires_at: Option<i64>,
}

impl AuthSession {
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(exp)) => !token.is_empty() && now < exp,
            _ => false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply a token endpoint response. Returns false (and leaves the
    /// session untouched) when the response carries no access token.
    ///
    /// Refresh responses may omit `refresh_token` or `user_id`; the old
    /// values are kept in that case.
    pub fn apply_token_response(&mut self, resp: &TokenResponse, now: i64) -> bool {
        let Some(token) = resp.access_token.as_deref().filter(|t| !t.is_empty()) else {
            return false;
        };

        self.access_token = Some(token.to_string());
        self.expires_at = Some(match resp.expires_in {
            None | Some(0) => NEVER_EXPIRES,
            Some(secs) => now
                .saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))
                .saturating_sub(EXPIRY_SAFETY_MARGIN_SECS),
        });
        if let Some(rt) = resp.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.refresh_token = Some(rt.to_string());
        }
        if resp.user_id.is_some() {
            self.user_id = resp.user_id;
        }
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Persistence for the session (config file, keyring, ...).
pub trait SessionStore: Send + Sync {
    fn save_session(&self, session: &AuthSession) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(token: Option<&str>, expires_in: Option<u64>, rt: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: token.map(String::from),
            expires_in,
            refresh_token: rt.map(String::from),
            user_id: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_validity_window() {
        let session = AuthSession {
            access_token: Some("tok".into()),
            expires_at: Some(1_000),
            ..Default::default()
        };
        assert!(session.is_valid_at(999));
        assert!(!session.is_valid_at(1_000));
        assert!(!session.is_valid_at(5_000));
    }

    #[test]
    fn test_huge_expires_in_saturates() {
        let mut session = AuthSession::default();
        assert!(session.apply_token_response(&response(Some("a"), Some(u64::MAX), None), 10_000));
        assert!(session.expires_at.unwrap() > 10_000);
        assert!(session.is_valid_at(10_000));
        assert!(session.is_valid_at(i64::MAX / 2));

        let mut session = AuthSession::default();
        assert!(session.apply_token_response(&response(Some("a"), Some(1 << 63), None), 10_000));
        assert!(session.is_valid_at(10_000));
    }

    #[test]
    fn test_missing_token_is_invalid() {
        let session = AuthSession {
            access_token: None,
            expires_at: Some(i64::MAX),
            ..Default::default()
        };
        assert!(!session.is_valid_at(0));
        assert!(!AuthSession::default().is_valid_at(0));
    }

    #[test]
    fn test_apply_sets_expiry_with_margin() {
        let mut session = AuthSession::default();
        assert!(session.apply_token_response(&response(Some("a"), Some(3600), Some("r")), 10_000));
        assert_eq!(session.access_token.as_deref(), Some("a"));
        assert_eq!(session.refresh_token.as_deref(), Some("r"));
        assert_eq!(session.user_id, Some(42));
        assert_eq!(session.expires_at, Some(10_000 + 3600 - 300));
    }

    #[test]
    fn test_apply_keeps_refresh_token_when_omitted() {
        let mut session = AuthSession {
            access_token: Some("old".into()),
            refresh_token: Some("keep-me".into()),
            user_id: Some(7),
            expires_at: Some(0),
        };
        let mut resp = response(Some("new"), Some(600), None);
        resp.user_id = None;
        assert!(session.apply_token_response(&resp, 0));
        assert_eq!(session.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(session.user_id, Some(7));
        assert_eq!(session.access_token.as_deref(), Some("new"));
    }

    #[test]
    fn test_apply_without_token_leaves_session() {
        let mut session = AuthSession::default();
        assert!(!session.apply_token_response(&response(None, Some(600), Some("r")), 0));
        assert!(session.is_empty());
    }

    #[test]
    fn test_offline_token_never_expires() {
        let mut session = AuthSession::default();
        session.apply_token_response(&response(Some("a"), Some(0), None), 100);
        assert_eq!(session.expires_at, Some(NEVER_EXPIRES));
        assert!(session.is_valid_at(i64::MAX - 1));
    }

    #[test]
    fn test_short_lifetime_is_already_expired() {
        let mut session = AuthSession::default();
        session.apply_token_response(&response(Some("a"), Some(60), None), 1_000);
        assert!(!session.is_valid_at(1_000));
    }
}
