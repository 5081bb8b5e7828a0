//! Search-to-playback orchestration
//!
//! `VideoSource` owns the process-wide state (API client and its session,
//! stream cache, quality preference) and chains the stages of a user
//! action: search, fetch the player page, extract, resolve.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use url::Url;

use crate::api::{search_query, search_videos, ApiClient, HttpApiTransport};
use crate::auth::oauth::token_manager;
use crate::config::{Config, ConfigStore};
use crate::error::VkError;
use crate::models::{QualityPreference, SearchResultItem};
use crate::stream::fetcher::{absolute, find_embed_url};
use crate::stream::{
    resolve, HttpPageFetcher, PageFetcher, Resolution, StreamCache, StreamExtractor, StreamMap,
};

/// Persists the quality preference.
pub trait PreferenceStore: Send + Sync {
    fn save_quality(&self, quality: &QualityPreference) -> Result<()>;
}

/// Result of a search that may have been overtaken by a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Results(Vec<SearchResultItem>),
    /// A later search started before this one finished.
    Superseded,
}

/// What to hand to the player.
#[derive(Debug, Clone)]
pub struct PlaybackTarget {
    pub title: String,
    /// Stream URL as discovered on the page
    pub url: String,
    pub resolution: Resolution,
    pub streams: Arc<StreamMap>,
}

impl PlaybackTarget {
    /// URL with protocol-relative form upgraded to https.
    pub fn playable_url(&self) -> String {
        absolute(&self.url)
    }

    /// Every quality the page offered, in page order.
    pub fn available(&self) -> Vec<&str> {
        self.streams.labels().collect()
    }
}

pub struct VideoSource {
    api: ApiClient,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<StreamExtractor>,
    cache: Arc<StreamCache>,
    quality: RwLock<QualityPreference>,
    prefs: Arc<dyn PreferenceStore>,
    generation: AtomicU64,
}

impl VideoSource {
    pub fn new(
        api: ApiClient,
        fetcher: Arc<dyn PageFetcher>,
        prefs: Arc<dyn PreferenceStore>,
        quality: QualityPreference,
    ) -> Self {
        Self {
            api,
            fetcher,
            extractor: Arc::new(StreamExtractor::new()),
            cache: Arc::new(StreamCache::default()),
            quality: RwLock::new(quality),
            prefs,
            generation: AtomicU64::new(0),
        }
    }

    /// Wire up the HTTP collaborators from the stored config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = ApiClient::new(
            Arc::new(HttpApiTransport::new()),
            token_manager(config)?,
            config.api_version(),
        );
        Ok(Self::new(
            api,
            Arc::new(HttpPageFetcher::new()?),
            Arc::new(ConfigStore),
            config.quality.clone(),
        ))
    }

    pub fn quality(&self) -> QualityPreference {
        self.quality
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run a search. Starting a new search invalidates the results of any
    /// search still in flight.
    pub async fn search(
        &self,
        title: &str,
        year: Option<u32>,
        limit: usize,
    ) -> Result<SearchOutcome, VkError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = search_query(title, year);
        tracing::info!("Searching for '{}'", query);

        let result = search_videos(&self.api, &query, limit).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Dropping results of superseded search '{}'", query);
            return Ok(SearchOutcome::Superseded);
        }
        result.map(SearchOutcome::Results)
    }

    /// Stream map for a content item, from cache or a fresh extraction.
    pub async fn streams(
        &self,
        content_id: &str,
        player_url: &str,
    ) -> Result<Arc<StreamMap>, VkError> {
        let fetcher = self.fetcher.clone();
        let extractor = self.extractor.clone();
        let id = content_id.to_string();
        let url = player_url.to_string();
        self.cache
            .get_or_extract(content_id, move || {
                fetch_and_extract(fetcher, extractor, url, id)
            })
            .await
    }

    /// Resolve the stream to play. `quality` overrides the stored
    /// preference for this call only.
    pub async fn play(
        &self,
        content_id: &str,
        title: &str,
        player_url: &str,
        quality: Option<&str>,
    ) -> Result<PlaybackTarget, VkError> {
        let streams = self.streams(content_id, player_url).await?;
        let preferred = match quality {
            Some(q) => QualityPreference::new(q),
            None => self.quality(),
        };

        let resolution = resolve(&streams, preferred.as_str())?;
        tracing::info!("Playing {} at {}", content_id, resolution);

        Ok(PlaybackTarget {
            title: title.to_string(),
            url: resolution.url.clone(),
            resolution,
            streams,
        })
    }

    pub async fn play_item(&self, item: &SearchResultItem) -> Result<PlaybackTarget, VkError> {
        self.play(&item.id, &item.title, &item.player_page_url, None)
            .await
    }

    /// Store a new preference; any label is accepted.
    pub fn select_quality(&self, label: &str) -> Result<QualityPreference> {
        let quality = QualityPreference::new(label);
        self.prefs.save_quality(&quality)?;
        *self.quality.write().unwrap_or_else(|e| e.into_inner()) = quality.clone();
        tracing::info!("Quality preference set to {}", quality);
        Ok(quality)
    }

    pub fn reset_quality(&self) -> Result<QualityPreference> {
        self.select_quality(QualityPreference::auto().as_str())
    }

    /// Forget cached streams and invalidate in-flight searches.
    /// Stored credentials are left alone; see `auth::logout`.
    #[allow(dead_code)]
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
    }
}

async fn fetch_and_extract(
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<StreamExtractor>,
    url: String,
    content_id: String,
) -> Result<StreamMap, VkError> {
    let page = fetcher.fetch(&url).await?;
    match extractor.extract(&page, &content_id) {
        Err(err @ VkError::ExtractionFailed { .. }) => match find_embed_url(&page) {
            Some(embed) if embed != url => {
                tracing::info!("Following og:video to the embed player for {}", content_id);
                let page = fetcher.fetch(&embed).await?;
                extractor.extract(&page, &content_id)
            }
            _ => Err(err),
        },
        other => other,
    }
}

/// Content id for a player URL: `<oid>_<id>` from its query when present,
/// otherwise the URL itself.
pub fn content_id_from_url(player_url: &str) -> String {
    let parsed = Url::parse(&absolute(player_url)).ok();
    let param = |name: &str| {
        parsed.as_ref().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        })
    };
    match (param("oid"), param("id")) {
        (Some(oid), Some(id)) => format!("{}_{}", oid, id),
        _ => player_url.to_string(),
    }
}
