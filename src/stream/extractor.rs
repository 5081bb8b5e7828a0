//! Runs matcher strategies over a player page

use super::map::StreamMap;
use super::matchers::{default_matchers, Matcher, Stage};
use crate::error::VkError;

/// Ordered matcher pipeline.
///
/// Primary matchers run in order until one yields entries; supplement
/// matchers then only add labels that are still missing.
pub struct StreamExtractor {
    matchers: Vec<Box<dyn Matcher>>,
}

impl StreamExtractor {
    pub fn new() -> Self {
        Self::with_matchers(default_matchers())
    }

    pub fn with_matchers(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn extract(&self, page: &str, content_id: &str) -> Result<StreamMap, VkError> {
        let mut streams = StreamMap::new();

        for matcher in self.stage(Stage::Primary) {
            streams = matcher.find(page);
            tracing::debug!(
                "{}: {} stream(s) for {}",
                matcher.name(),
                streams.len(),
                content_id
            );
            if !streams.is_empty() {
                break;
            }
        }

        for matcher in self.stage(Stage::Supplement) {
            let before = streams.len();
            streams.merge(matcher.find(page));
            if streams.len() > before {
                tracing::debug!("{} added {} stream(s)", matcher.name(), streams.len() - before);
            }
        }

        if streams.is_empty() {
            tracing::info!("No stream found on player page for {}", content_id);
            return Err(VkError::ExtractionFailed {
                content_id: content_id.to_string(),
            });
        }
        Ok(streams)
    }

    fn stage(&self, stage: Stage) -> impl Iterator<Item = &dyn Matcher> {
        self.matchers
            .iter()
            .map(|m| &**m)
            .filter(move |m| m.stage() == stage)
    }
}

impl Default for StreamExtractor {
    fn default() -> Self {
        Self::new()
    }
}
