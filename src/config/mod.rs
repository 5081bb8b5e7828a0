//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::{AuthSession, SessionStore};
use crate::models::QualityPreference;
use crate::source::PreferenceStore;

pub const DEFAULT_API_VERSION: &str = "5.199";

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// VK application id (must be registered by the user)
    pub client_id: Option<String>,
    /// Redirect URI registered for the application
    pub redirect_uri: Option<String>,
    /// API version sent as `v` with every call
    pub api_version: Option<String>,
    /// Preferred playback quality
    #[serde(default)]
    pub quality: QualityPreference,
    /// CSRF state of a login waiting for its redirect
    pub oauth_state: Option<String>,
    /// Stored OAuth2 session
    #[serde(default)]
    pub session: AuthSession,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "vkvideo-cli", "vkvideo-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Config path for messages; never fails.
    pub fn path_hint() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }
}

/// Writes session and preference changes back into the config file.
///
/// Reloads before saving so settings changed by another command survive.
pub struct ConfigStore;

impl SessionStore for ConfigStore {
    fn save_session(&self, session: &AuthSession) -> Result<()> {
        let mut config = Config::load()?;
        config.session = session.clone();
        config.save()
    }
}

impl PreferenceStore for ConfigStore {
    fn save_quality(&self, quality: &QualityPreference) -> Result<()> {
        let mut config = Config::load()?;
        config.quality = quality.clone();
        config.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.api_version(), "5.199");
        assert_eq!(config.quality.as_str(), "auto");
        assert!(config.session.is_empty());
    }

    #[test]
    fn test_session_survives_toml() {
        let config = Config {
            client_id: Some("51234".into()),
            quality: QualityPreference::new("720p"),
            session: AuthSession {
                access_token: Some("tok".into()),
                refresh_token: None,
                user_id: Some(9),
                expires_at: Some(i64::MAX),
            },
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.session, config.session);
        assert_eq!(back.quality.as_str(), "720p");
        assert_eq!(back.client_id.as_deref(), Some("51234"));
    }
}
