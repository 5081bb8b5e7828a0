//! Video search models

use serde::{Deserialize, Serialize};

/// Raw `video.search` response body
#[derive(Debug, Deserialize)]
pub struct VideoSearchResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub items: Vec<VkVideo>,
}

/// Video object as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct VkVideo {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: u64,
    /// Thumbnails, smallest first
    #[serde(default)]
    pub image: Vec<VkImage>,
    /// Embed player page
    pub player: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VkImage {
    pub url: String,
}

/// Normalised search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    /// `<owner_id>_<id>`
    pub id: String,
    pub title: String,
    pub description: String,
    pub poster_url: Option<String>,
    pub player_page_url: String,
    pub duration_seconds: u64,
}

impl SearchResultItem {
    /// `None` for videos without an embed player (nothing to play).
    pub fn from_raw(video: VkVideo) -> Option<Self> {
        let player_page_url = video.player.filter(|p| !p.is_empty())?;
        Some(Self {
            id: format!("{}_{}", video.owner_id, video.id),
            title: video.title,
            description: video.description,
            poster_url: video.image.last().map(|i| i.url.clone()),
            player_page_url,
            duration_seconds: video.duration,
        })
    }

    /// `h:mm:ss` or `m:ss`
    pub fn duration_display(&self) -> String {
        let s = self.duration_seconds;
        if s >= 3600 {
            format!("{}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
        } else {
            format!("{}:{:02}", s / 60, s % 60)
        }
    }
}
