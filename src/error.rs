//! Typed errors for the session, API and stream layers

use thiserror::Error;

/// Failure kinds surfaced by the core.
///
/// `Clone` so a single in-flight refresh or extraction can hand the same
/// outcome to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VkError {
    /// Network or IO failure. Never retried by the core.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected and could not be recovered. The session is cleared.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A refresh call did not yield a new access token.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// No access token and no refresh token to obtain one.
    #[error("not authenticated")]
    Unauthenticated,

    /// Remote-reported failure other than an auth failure.
    #[error("remote API error {code}: {message}")]
    RemoteApi { code: i64, message: String },

    /// Nothing playable could be discovered on the player page.
    #[error("no stream could be extracted for {content_id}")]
    ExtractionFailed { content_id: String },

    /// Resolution was asked to pick from an empty stream map.
    #[error("no stream available")]
    NoStreamAvailable,
}

/// What the user can do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Retry,
    Relogin,
    PickOtherContent,
}

impl VkError {
    pub fn hint(&self) -> Hint {
        match self {
            VkError::Transport(_) | VkError::RemoteApi { .. } => Hint::Retry,
            VkError::Auth(_) | VkError::SessionExpired(_) | VkError::Unauthenticated => {
                Hint::Relogin
            }
            VkError::ExtractionFailed { .. } | VkError::NoStreamAvailable => {
                Hint::PickOtherContent
            }
        }
    }
}

impl From<reqwest::Error> for VkError {
    fn from(e: reqwest::Error) -> Self {
        VkError::Transport(e.to_string())
    }
}

impl std::fmt::Display for Hint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hint::Retry => f.write_str("cannot reach the service, try again later"),
            Hint::Relogin => f.write_str("not authenticated, run 'vkvideo-cli login'"),
            Hint::PickOtherContent => f.write_str("stream not found, pick a different video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_distinguish_user_actions() {
        assert_eq!(VkError::Transport("reset".into()).hint(), Hint::Retry);
        assert_eq!(VkError::Unauthenticated.hint(), Hint::Relogin);
        assert_eq!(VkError::SessionExpired("x".into()).hint(), Hint::Relogin);
        assert_eq!(
            VkError::ExtractionFailed {
                content_id: "1_2".into()
            }
            .hint(),
            Hint::PickOtherContent
        );
    }
}
