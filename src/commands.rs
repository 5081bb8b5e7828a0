//! Command handlers for search, streams, playback and quality settings

use anyhow::{Context, Result};

use crate::config::Config;
use crate::error::VkError;
use crate::models::quality::STANDARD_QUALITIES;
use crate::source::{content_id_from_url, PlaybackTarget, SearchOutcome, VideoSource};

/// Attach the user-facing hint to a core error.
fn explain(err: VkError) -> anyhow::Error {
    let hint = err.hint();
    anyhow::Error::new(err).context(hint.to_string())
}

fn open_source() -> Result<VideoSource> {
    let config = Config::load()?;
    VideoSource::from_config(&config).context("Failed to set up the video source")
}

/// Search videos by title; `play` picks a result (1-based) and resolves it
pub async fn search(
    title: &str,
    year: Option<u32>,
    limit: usize,
    play: Option<usize>,
    json: bool,
) -> Result<()> {
    let source = open_source()?;
    let items = match source.search(title, year, limit).await.map_err(explain)? {
        SearchOutcome::Results(items) => items,
        SearchOutcome::Superseded => return Ok(()),
    };

    if let Some(n) = play {
        let item = n
            .checked_sub(1)
            .and_then(|i| items.get(i))
            .with_context(|| format!("No result #{} ({} found)", n, items.len()))?;
        let target = source.play_item(item).await.map_err(explain)?;
        print_target(&target);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No videos found.");
        return Ok(());
    }

    println!();
    for (i, item) in items.iter().enumerate() {
        println!(
            "{:>3}. [{}] {} ({})",
            i + 1,
            item.id,
            item.title,
            item.duration_display()
        );
        println!("     {}", item.player_page_url);
    }
    println!();
    Ok(())
}

/// List the streams discovered on a player page
pub async fn streams(player_url: &str, id: Option<String>, json: bool) -> Result<()> {
    let source = open_source()?;
    let id = id.unwrap_or_else(|| content_id_from_url(player_url));
    let streams = source.streams(&id, player_url).await.map_err(explain)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*streams)?);
        return Ok(());
    }

    println!();
    for (label, url) in streams.iter() {
        println!("{:>8}  {}", label, url);
    }
    println!();
    Ok(())
}

/// Resolve the stream to play and print its URL
pub async fn play(player_url: &str, id: Option<String>, quality: Option<String>) -> Result<()> {
    let source = open_source()?;
    let id = id.unwrap_or_else(|| content_id_from_url(player_url));
    let target = source
        .play(&id, &id, player_url, quality.as_deref())
        .await
        .map_err(explain)?;

    print_target(&target);
    Ok(())
}

/// Stream URL on stdout so it can be piped into a player.
fn print_target(target: &PlaybackTarget) {
    if target.resolution.is_fallback() {
        tracing::warn!("Preferred quality unavailable for {}", target.title);
    }
    eprintln!("Quality: {}", target.resolution.effective_label());
    eprintln!("Available: {}", target.available().join(", "));
    println!("{}", target.playable_url());
}

pub async fn quality_show() -> Result<()> {
    let config = Config::load()?;
    println!("Preferred quality: {}", config.quality);
    println!("Choices: {}", STANDARD_QUALITIES.join(", "));
    if config.quality.is_auto() {
        println!("(plays the page's default stream)");
    } else if !config.quality.is_standard() {
        println!("(custom label, matched against the labels a page offers)");
    }
    Ok(())
}

pub async fn quality_set(label: &str) -> Result<()> {
    let source = open_source()?;
    let quality = source.select_quality(label)?;
    println!("Preferred quality set to {}.", quality);
    Ok(())
}

pub async fn quality_reset() -> Result<()> {
    let source = open_source()?;
    source.reset_quality()?;
    println!("Preferred quality reset to auto.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_leads_with_hint() {
        let err = explain(VkError::Unauthenticated);
        assert_eq!(err.to_string(), "not authenticated, run 'vkvideo-cli login'");
        assert_eq!(err.root_cause().to_string(), "not authenticated");
    }
}
