//! Playback quality preference

use serde::{Deserialize, Serialize};

pub const AUTO: &str = "auto";

/// Choices offered to the user; stream maps may carry other labels too.
pub const STANDARD_QUALITIES: [&str; 5] = [AUTO, "1080p", "720p", "480p", "360p"];

/// User's preferred quality label, normalised (lowercase, no whitespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct QualityPreference(String);

impl QualityPreference {
    /// Empty input falls back to `auto`.
    pub fn new(label: &str) -> Self {
        let label = collapse(label);
        if label.is_empty() {
            Self::auto()
        } else {
            Self(label)
        }
    }

    pub fn auto() -> Self {
        Self(AUTO.to_string())
    }

    pub fn is_auto(&self) -> bool {
        self.0 == AUTO
    }

    pub fn is_standard(&self) -> bool {
        STANDARD_QUALITIES.contains(&self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for QualityPreference {
    fn default() -> Self {
        Self::auto()
    }
}

impl From<String> for QualityPreference {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<QualityPreference> for String {
    fn from(q: QualityPreference) -> Self {
        q.0
    }
}

impl std::fmt::Display for QualityPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and drop all whitespace.
pub fn collapse(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Comparison key for labels: `"1080"`, `"1080P"` and `" 1080p "` are equal.
pub fn canonical(label: &str) -> String {
    let mut label = collapse(label);
    if label.len() > 1
        && label.ends_with('p')
        && label[..label.len() - 1].bytes().all(|b| b.is_ascii_digit())
    {
        label.pop();
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalises() {
        assert_eq!(QualityPreference::new(" 720P ").as_str(), "720p");
        assert_eq!(QualityPreference::new("").as_str(), "auto");
        assert!(QualityPreference::new("AUTO").is_auto());
        assert!(QualityPreference::new("1080p").is_standard());
        assert!(!QualityPreference::new("1440p").is_standard());
    }

    #[test]
    fn test_canonical_equates_resolution_forms() {
        assert_eq!(canonical("1080"), canonical("1080p"));
        assert_eq!(canonical("1080 P"), "1080");
        assert_eq!(canonical("hls"), "hls");
        assert_eq!(canonical("p"), "p");
        assert_ne!(canonical("auto"), canonical("auto_2"));
    }
}
