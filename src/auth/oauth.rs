//! OAuth2 authorization code flow for VK: authorize URL, code exchange, logout

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use url::Url;

use super::{AuthConfig, HttpTokenEndpoint, TokenManager};
use crate::config::{Config, ConfigStore};

/// Build the authorization URL the user has to open in a browser.
pub fn authorize_url(auth_config: &AuthConfig) -> Result<(Url, CsrfToken)> {
    let client = BasicClient::new(
        ClientId::new(auth_config.client_id.clone()),
        None,
        AuthUrl::new(auth_config.auth_url.clone())?,
        None,
    )
    .set_redirect_uri(
        RedirectUrl::new(auth_config.redirect_uri.clone()).context("Invalid redirect_uri")?,
    );

    Ok(client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(auth_config.scope.to_string()))
        .add_extra_param("display", "page")
        .add_extra_param("v", auth_config.api_version.clone())
        .url())
}

/// Pull `code` and `state` out of the redirect URL the browser landed on.
pub fn parse_redirect(redirect: &str) -> Result<(String, Option<String>)> {
    let url = Url::parse(redirect).context("Invalid redirect URL")?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error_description" => bail!("Authorization denied: {}", value),
            _ => {}
        }
    }
    let code = code.context("Redirect URL has no 'code' parameter")?;
    Ok((code, state))
}

/// Build a token manager around the stored session, writing back to config.
pub fn token_manager(config: &Config) -> Result<TokenManager> {
    let auth_config = AuthConfig::from_config(config)?;
    Ok(TokenManager::new(
        config.session.clone(),
        Arc::new(HttpTokenEndpoint::new(auth_config)),
        Arc::new(ConfigStore),
    ))
}

/// Login entry point.
///
/// Without a code, prints the authorization URL and remembers its state.
/// With a code (or the full redirect URL), verifies the state and exchanges
/// the code for a token.
pub async fn login(
    code: Option<String>,
    state: Option<String>,
    redirect: Option<String>,
    force: bool,
) -> Result<()> {
    let mut config = Config::load()?;
    let auth_config = AuthConfig::from_config(&config)?;

    let (code, state) = match (redirect, code) {
        (Some(redirect), _) => {
            let (code, from_url) = parse_redirect(&redirect)?;
            (Some(code), from_url.or(state))
        }
        (None, code) => (code, state),
    };

    let Some(code) = code else {
        if !force && config.session.is_valid() {
            println!("Already logged in. Use --force to re-authenticate.");
            return Ok(());
        }

        let (url, csrf) = authorize_url(&auth_config)?;
        config.oauth_state = Some(csrf.secret().clone());
        config.save()?;

        println!();
        println!("To sign in, visit: {}", url);
        println!("Then run: vkvideo-cli login --redirect '<the URL you were sent to>'");
        println!();
        return Ok(());
    };

    // The stored state is single-use whatever the outcome.
    let expected = config.oauth_state.take();
    config.save()?;
    match (expected, state) {
        (Some(expected), Some(got)) if expected == got => {}
        (None, _) => bail!("No login in progress. Run 'vkvideo-cli login' first."),
        _ => bail!("Authorization state mismatch; start the login again."),
    }

    let tokens = token_manager(&config)?;
    let session = tokens
        .exchange_code(&code)
        .await
        .context("Failed to exchange authorization code")?;

    match session.user_id {
        Some(id) => println!("Login successful (user id {}).", id),
        None => println!("Login successful."),
    }
    Ok(())
}

/// Force a token refresh.
pub async fn refresh() -> Result<()> {
    let config = Config::load()?;
    let tokens = token_manager(&config)?;
    tokens.refresh().await.context("Token refresh failed")?;
    println!("Token refreshed successfully.");
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    if config.session.is_empty() && config.oauth_state.is_none() {
        println!("Not logged in.");
        return Ok(());
    }
    config.session.clear();
    config.oauth_state = None;
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;
    let session = &config.session;

    match (&session.access_token, session.expires_at) {
        (Some(_), Some(exp)) if session.is_valid() => {
            println!("Access token: valid");
            if exp == super::session::NEVER_EXPIRES {
                println!("  expires_at: never");
            } else {
                println!("  expires_at: {}", format_timestamp(exp));
            }
        }
        (Some(_), _) => println!("Access token: expired"),
        (None, _) => println!("Access token: none"),
    }

    if session.has_refresh_token() {
        println!("Refresh tok:  present");
    } else {
        println!("Refresh tok:  none");
    }

    if let Some(id) = session.user_id {
        println!("User id:      {}", id);
    }
    println!("Quality:      {}", config.quality);

    if config.client_id.is_none() || config.redirect_uri.is_none() {
        println!("\nclient_id/redirect_uri missing; edit {}", Config::path_hint());
    } else if session.access_token.is_none() {
        println!("\nRun 'vkvideo-cli login' to authenticate.");
    }

    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
