//! OAuth2 token endpoint: wire types and HTTP implementation

use async_trait::async_trait;
use serde::Deserialize;

use super::AuthConfig;
use crate::error::VkError;

/// Raw token endpoint reply. Either the token fields or `error` are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Best human-readable reason for a reply without a token.
    pub fn failure_reason(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "no access_token in response".to_string())
    }
}

/// The provider's token endpoint.
///
/// Implementations return `Ok` for any decodable reply, including
/// `{error, error_description}`; only transport failures are `Err`.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, VkError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, VkError>;
}

/// Token endpoint reached over HTTPS.
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    config: AuthConfig,
}

impl HttpTokenEndpoint {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<TokenResponse, VkError> {
        tracing::debug!("Token POST {}", self.config.token_url);

        let resp = self
            .http
            .post(&self.config.token_url)
            .query(params)
            .send()
            .await?;

        // Error replies come back as 4xx with a JSON body, so decode regardless of status.
        let status = resp.status();
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            VkError::Transport(format!(
                "HTTP {} from token endpoint, undecodable body: {}",
                status.as_u16(),
                e
            ))
        })
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, VkError> {
        self.post(&[
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, VkError> {
        self.post(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_reply() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","expires_in":86400,"user_id":12345,"refresh_token":"r1"}"#,
        )
        .unwrap();
        assert_eq!(resp.access_token.as_deref(), Some("abc"));
        assert_eq!(resp.expires_in, Some(86400));
        assert_eq!(resp.user_id, Some(12345));
    }

    #[test]
    fn test_decode_error_reply() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Code is expired."}"#,
        )
        .unwrap();
        assert!(resp.access_token.is_none());
        assert_eq!(resp.failure_reason(), "Code is expired.");

        let bare: TokenResponse = serde_json::from_str(r#"{"error":"invalid_client"}"#).unwrap();
        assert_eq!(bare.failure_reason(), "invalid_client");
    }
}
