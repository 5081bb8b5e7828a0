//! Short-lived memo of extraction results per content id

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::map::StreamMap;
use crate::error::VkError;
use crate::singleflight::SingleFlight;

pub const STREAM_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub streams: Arc<StreamMap>,
    pub created_at: Instant,
}

/// Extraction cache. Stale entries are ignored, not evicted, and get
/// overwritten by the next successful extraction.
pub struct StreamCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    extractions: SingleFlight<String, Result<Arc<StreamMap>, VkError>>,
    /// Bumped by `clear`; extractions started before it do not write back.
    epoch: AtomicU64,
}

impl StreamCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            extractions: SingleFlight::new(),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn get(&self, content_id: &str) -> Option<Arc<StreamMap>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(content_id)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .map(|entry| entry.streams.clone())
    }

    pub fn put(&self, content_id: &str, streams: Arc<StreamMap>) {
        let entry = CacheEntry {
            streams,
            created_at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(content_id.to_string(), entry);
    }

    /// Cached streams, or run `extract` and cache its result.
    ///
    /// Concurrent misses for the same id share one extraction. Only a
    /// completed, successful extraction is written, and only if the cache
    /// was not cleared meanwhile.
    pub async fn get_or_extract<F, Fut>(
        self: &Arc<Self>,
        content_id: &str,
        extract: F,
    ) -> Result<Arc<StreamMap>, VkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StreamMap, VkError>> + Send + 'static,
    {
        if let Some(streams) = self.get(content_id) {
            tracing::info!("Returning cached streams for {}", content_id);
            return Ok(streams);
        }

        let cache = self.clone();
        let id = content_id.to_string();
        self.extractions
            .run(id.clone(), move || {
                let epoch = cache.epoch.load(Ordering::SeqCst);
                let pending = extract();
                async move {
                    let streams = Arc::new(pending.await?);
                    if cache.epoch.load(Ordering::SeqCst) == epoch {
                        cache.put(&id, streams.clone());
                    } else {
                        tracing::debug!("Cache cleared during extraction of {}, not storing", id);
                    }
                    Ok(streams)
                }
            })
            .await
    }

    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for StreamCache {
    fn default() -> Self {
        Self::new(STREAM_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> StreamMap {
        [("720p", "https://x/720.mp4")].into_iter().collect()
    }

    async fn fetch_counted(
        cache: &Arc<StreamCache>,
        fetches: &Arc<AtomicUsize>,
    ) -> Result<Arc<StreamMap>, VkError> {
        let fetches = fetches.clone();
        cache
            .get_or_extract("1_1", move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(sample())
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_and_refetch_after() {
        let cache = Arc::new(StreamCache::default());
        let fetches = Arc::new(AtomicUsize::new(0));

        let first = fetch_counted(&cache, &fetches).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = fetch_counted(&cache, &fetches).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert!(cache.get("1_1").is_none());
        let third = fetch_counted(&cache, &fetches).await.unwrap();
        assert_eq!(*third, sample());
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_extract_once() {
        let cache = Arc::new(StreamCache::default());
        let fetches = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            fetch_counted(&cache, &fetches),
            fetch_counted(&cache, &fetches),
            fetch_counted(&cache, &fetches),
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert!(c.is_ok());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = Arc::new(StreamCache::default());
        let err = cache
            .get_or_extract("9_9", || async {
                Err(VkError::ExtractionFailed {
                    content_id: "9_9".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VkError::ExtractionFailed { .. }));
        assert!(cache.get("9_9").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_extraction_is_not_refilled() {
        let cache = Arc::new(StreamCache::default());
        let fetches = Arc::new(AtomicUsize::new(0));

        let pending = {
            let (cache, fetches) = (cache.clone(), fetches.clone());
            tokio::spawn(async move { fetch_counted(&cache, &fetches).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        cache.clear();
        assert!(pending.await.unwrap().is_ok());
        assert!(cache.get("1_1").is_none());

        fetch_counted(&cache, &fetches).await.unwrap();
        assert!(cache.get("1_1").is_some());
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = StreamCache::default();
        cache.put("1", Arc::new(sample()));
        let replacement: StreamMap = [("hls", "https://x/h.m3u8")].into_iter().collect();
        cache.put("1", Arc::new(replacement.clone()));
        assert_eq!(*cache.get("1").unwrap(), replacement);
    }
}
