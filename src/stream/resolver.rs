//! Pick the stream to play for a quality preference

use std::fmt;

use super::map::StreamMap;
use crate::error::VkError;
use crate::models::quality::AUTO;

/// How the played stream relates to what was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// The preferred quality was available.
    None,
    /// Preferred quality missing, `auto` used instead.
    Auto { requested: String },
    /// Neither preferred nor `auto` present; first entry used.
    FirstAvailable { requested: String },
}

/// Outcome of quality resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    /// Label of the chosen entry as stored in the map
    pub label: String,
    pub fallback: Fallback,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        self.fallback != Fallback::None
    }

    /// Label for display and logs, e.g. `auto (fallback from 1440p)`.
    pub fn effective_label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fallback {
            Fallback::None => write!(f, "{}", self.label),
            Fallback::Auto { requested } => write!(f, "{} (fallback from {})", self.label, requested),
            Fallback::FirstAvailable { requested } => write!(
                f,
                "{} (fallback from {} - first available)",
                self.label, requested
            ),
        }
    }
}

/// Exact (case-insensitive, `720` ≡ `720p`) match, then `auto`, then the
/// first entry in insertion order.
pub fn resolve(streams: &StreamMap, preferred: &str) -> Result<Resolution, VkError> {
    if let Some((label, url)) = streams.find_equivalent(preferred) {
        return Ok(Resolution {
            url: url.to_string(),
            label: label.to_string(),
            fallback: Fallback::None,
        });
    }

    let requested = preferred.trim().to_lowercase();
    if requested != AUTO {
        if let Some(url) = streams.get(AUTO) {
            tracing::info!("Quality '{}' not found, falling back to 'auto'", requested);
            return Ok(Resolution {
                url: url.to_string(),
                label: AUTO.to_string(),
                fallback: Fallback::Auto { requested },
            });
        }
    }

    let (label, url) = streams.first().ok_or(VkError::NoStreamAvailable)?;
    tracing::info!(
        "Quality '{}' and 'auto' not found, falling back to first available ('{}')",
        requested,
        label
    );
    Ok(Resolution {
        url: url.to_string(),
        label: label.to_string(),
        fallback: Fallback::FirstAvailable { requested },
    })
}
