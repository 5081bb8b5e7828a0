//! Authentication module for VK
//!
//! Implements the OAuth2 authorization code flow against oauth.vk.com.
//! The interactive consent step happens in the user's browser; this module
//! only builds the authorization URL and consumes the returned code.

pub mod manager;
pub mod oauth;
pub mod session;
pub mod tokens;

use anyhow::{bail, Result};

pub use manager::TokenManager;
pub use oauth::{login, logout, refresh, status};
pub use session::{AuthSession, SessionStore};
pub use tokens::HttpTokenEndpoint;

use crate::config::Config;

const AUTH_URL: &str = "https://oauth.vk.com/authorize";
const TOKEN_URL: &str = "https://oauth.vk.com/access_token";

/// OAuth2 client configuration for a VK application
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// VK application id
    pub client_id: String,
    /// Redirect URI registered for the application
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    /// VK scopes are comma separated, so this goes out as a single scope value
    pub scope: &'static str,
    pub api_version: String,
}

impl AuthConfig {
    /// Build from the stored config; both app identifiers must be set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (Some(client_id), Some(redirect_uri)) =
            (config.client_id.clone(), config.redirect_uri.clone())
        else {
            bail!(
                "client_id and redirect_uri are not configured. Set them in {}",
                Config::path_hint()
            );
        };

        Ok(Self {
            client_id,
            redirect_uri,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            scope: "video,offline",
            api_version: config.api_version().to_string(),
        })
    }
}
