//! Video search (`video.search`)

use crate::error::VkError;
use crate::models::{SearchResultItem, VideoSearchResponse};

use super::client::ApiClient;

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Query text: the title, with the release year appended when given.
pub fn search_query(title: &str, year: Option<u32>) -> String {
    match year {
        Some(year) => format!("{} {}", title.trim(), year),
        None => title.trim().to_string(),
    }
}

/// Search videos and normalise the playable hits.
pub async fn search_videos(
    client: &ApiClient,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchResultItem>, VkError> {
    let params = [
        ("q", query.to_string()),
        ("count", limit.to_string()),
        ("adult", "0".to_string()),
        ("filters", "mp4".to_string()),
    ];
    let value = client.call("video.search", &params).await?;
    let resp: VideoSearchResponse = serde_json::from_value(value)
        .map_err(|e| VkError::Transport(format!("Failed to parse video.search response: {}", e)))?;

    tracing::debug!("video.search returned {} of {} items", resp.items.len(), resp.count);

    Ok(resp
        .items
        .into_iter()
        .filter_map(|video| {
            let (owner, id) = (video.owner_id, video.id);
            let item = SearchResultItem::from_raw(video);
            if item.is_none() {
                tracing::debug!("Skipping {}_{}: no player URL", owner, id);
            }
            item
        })
        .collect())
}
