//! Player page retrieval

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::matchers::clean_url;
use crate::error::VkError;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static OG_VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+property="og:video"\s+content="([^"<>]+)""#).unwrap()
});

/// Raw text of a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, VkError>;
}

/// Fetches pages over HTTPS with a browser user agent.
pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, VkError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, VkError> {
        let url = absolute(url);
        tracing::debug!("Page GET {}", url);

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VkError::Transport(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }
        Ok(resp.text().await?)
    }
}

/// Embed player URL advertised by a public video page.
pub fn find_embed_url(page: &str) -> Option<String> {
    OG_VIDEO_RE
        .captures(page)
        .map(|caps| clean_url(&caps[1]))
        .filter(|url| !url.is_empty())
}

/// Upgrade a protocol-relative URL to https.
pub fn absolute(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}
