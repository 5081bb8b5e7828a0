//! Authenticated client for the VK API
//!
//! Wraps a transport with token injection and a single refresh-and-retry
//! when the API reports an invalid token.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::TokenManager;
use crate::error::VkError;

const API_BASE: &str = "https://api.vk.com/method";

/// VK `error_code` for an invalid or expired access token.
pub const AUTH_ERROR_CODE: i64 = 5;

/// Sends one method call and returns the decoded JSON envelope.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn invoke(&self, method: &str, params: &[(String, String)]) -> Result<Value, VkError>;
}

/// POSTs form-encoded method calls to api.vk.com.
pub struct HttpApiTransport {
    http: reqwest::Client,
}

impl HttpApiTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpApiTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiTransport for HttpApiTransport {
    async fn invoke(&self, method: &str, params: &[(String, String)]) -> Result<Value, VkError> {
        let url = format!("{}/{}", API_BASE, method);
        tracing::debug!("API POST {}", url);

        let resp = self.http.post(&url).form(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VkError::Transport(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }
        Ok(resp.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

enum Reply {
    Ok(Value),
    TokenRejected,
    Failed(VkError),
}

fn classify(envelope: Value) -> Reply {
    if let Some(err) = envelope.get("error") {
        return match ApiErrorBody::deserialize(err) {
            Ok(body) if body.error_code == AUTH_ERROR_CODE => Reply::TokenRejected,
            Ok(body) => Reply::Failed(VkError::RemoteApi {
                code: body.error_code,
                message: body.error_msg,
            }),
            Err(e) => Reply::Failed(VkError::Transport(format!("Malformed API error: {}", e))),
        };
    }
    match envelope {
        Value::Object(mut map) => match map.remove("response") {
            Some(response) => Reply::Ok(response),
            None => Reply::Failed(VkError::Transport(
                "API reply has neither 'response' nor 'error'".to_string(),
            )),
        },
        _ => Reply::Failed(VkError::Transport("API reply is not an object".to_string())),
    }
}

/// API client bound to a token manager.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn ApiTransport>,
    tokens: TokenManager,
    api_version: String,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        tokens: TokenManager,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            api_version: api_version.into(),
        }
    }

    /// Call `method` and return its `response` payload.
    ///
    /// An invalid-token reply triggers one refresh and one retry. If that
    /// refresh fails, or the retry is rejected again, the session is cleared
    /// and `VkError::Auth` returned.
    pub async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, VkError> {
        let session = self.tokens.ensure_valid().await?;
        let token = session.access_token.unwrap_or_default();

        match classify(self.send(method, params, &token).await?) {
            Reply::Ok(value) => return Ok(value),
            Reply::Failed(e) => return Err(e),
            Reply::TokenRejected => {
                tracing::info!("{} rejected the access token, refreshing", method);
            }
        }

        let refreshed = match self.tokens.refresh_rejected(&token).await {
            Ok(session) => session,
            Err(e) => {
                self.tokens.clear();
                return Err(VkError::Auth(format!("token refresh failed: {}", e)));
            }
        };
        let token = refreshed.access_token.unwrap_or_default();

        match classify(self.send(method, params, &token).await?) {
            Reply::Ok(value) => Ok(value),
            Reply::Failed(e) => Err(e),
            Reply::TokenRejected => {
                self.tokens.clear();
                Err(VkError::Auth(
                    "access token rejected after refresh".to_string(),
                ))
            }
        }
    }

    async fn send(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<Value, VkError> {
        let mut form: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        form.push(("access_token".to_string(), token.to_string()));
        form.push(("v".to_string(), self.api_version.clone()));
        self.transport.invoke(method, &form).await
    }
}
