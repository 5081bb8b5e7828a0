//! Independent strategies that pull stream URLs out of player page text
//!
//! Each matcher is a pure function from page text to a (possibly empty)
//! `StreamMap`. `StreamExtractor` decides the order and how results combine.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::map::StreamMap;
use crate::models::quality::collapse;

/// Variable names player pages bind their parameter object to.
pub const PLAYER_PARAM_BINDINGS: [&str; 4] = [
    "playerParams",
    "mvData",
    "player_vars",
    "VideoPlayer._initParams",
];

/// Label reserved for an HLS manifest.
pub const HLS: &str = "hls";
pub const DASH: &str = "dash";

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>(.*?)</script>").unwrap());

static KEYED_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)"((?:url|src|mp4|hls)_?(?:\d{3,4}|[a-z]+)?)"\s*:\s*"((?:https?:)?(?:\\?/){2}[^"\s]+?\.(?:mp4|m3u8)(?:\?[^"\s]*)?)""#,
    )
    .unwrap()
});

static BARE_MP4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"((?:https?:)?(?:\\?/){2}[^"\s]+?\.mp4(?:\?[^"\s]*)?)""#).unwrap()
});

static MANIFEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?:(?:\\?/){2}[^"'\s<>]+?\.m3u8(?:\?[^"'\s<>]*)?"#).unwrap()
});

/// When a matcher runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Tried in order until one returns something.
    Primary,
    /// Always run afterwards; only fills labels still missing.
    Supplement,
}

pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage {
        Stage::Primary
    }

    fn find(&self, page: &str) -> StreamMap;
}

/// Embedded-object, inline-pattern, then manifest recovery.
pub fn default_matchers() -> Vec<Box<dyn Matcher>> {
    vec![
        Box::new(EmbeddedObjectMatcher::new(&PLAYER_PARAM_BINDINGS)),
        Box::new(InlinePatternMatcher),
        Box::new(ManifestMatcher),
    ]
}

/// A script block whose parameter object could not be decoded.
#[derive(Debug, Error)]
#[error("malformed `{binding}` object in script block {block}: {reason}")]
pub struct MalformedFragment {
    pub binding: String,
    pub block: usize,
    pub reason: String,
}

/// Stream container recognised from a MIME type or a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Hls,
    Dash,
}

impl Container {
    /// Substring match, so `video/mp4` and `application/x-mpegURL` both work.
    pub fn from_type(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("mp4") {
            Some(Self::Mp4)
        } else if mime.contains("mpegurl") {
            Some(Self::Hls)
        } else if mime.contains("dash") {
            Some(Self::Dash)
        } else {
            None
        }
    }

    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.to_ascii_lowercase();
        if url.contains(".mp4") {
            Some(Self::Mp4)
        } else if url.contains(".m3u8") {
            Some(Self::Hls)
        } else if url.contains(".mpd") {
            Some(Self::Dash)
        } else {
            None
        }
    }

    /// Label for an entry that came without one.
    pub fn default_label(self) -> &'static str {
        match self {
            Self::Mp4 => "auto",
            Self::Hls => HLS,
            Self::Dash => DASH,
        }
    }
}

/// Undo JS/HTML escaping found in inline URLs.
pub fn clean_url(raw: &str) -> String {
    raw.trim().replace("\\/", "/").replace("&amp;", "&")
}

fn looks_like_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://") || url.starts_with("//")
}

/// Quality label from a parameter key: `url1080` → `1080`, `mp4_720` → `720`.
///
/// Returns `None` for keys that carry no quality (`url`, `src`, `mp4`).
pub fn label_from_key(key: &str) -> Option<String> {
    let key = collapse(key);
    for prefix in ["url", "src", "mp4"] {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        let label = rest.trim_start_matches(['_', '-']);
        if label.is_empty() {
            return None;
        }
        if rest.starts_with(['_', '-']) || rest.starts_with(|c: char| c.is_ascii_digit()) {
            return Some(label.to_string());
        }
    }
    (!key.is_empty()).then_some(key)
}

fn fallback_label(url: &str) -> &'static str {
    Container::from_url(url).map_or("auto", Container::default_label)
}

/// Script bodies of the page; the whole page if it has no script tags.
fn script_blocks(page: &str) -> Vec<&str> {
    let blocks: Vec<&str> = SCRIPT_RE
        .captures_iter(page)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if blocks.is_empty() {
        vec![page]
    } else {
        blocks
    }
}

/// The `{...}` literal starting at `start`, honouring strings and escapes.
fn object_literal(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Embedded object
// ---------------------------------------------------------------------------

/// Finds a JSON object bound to a known player variable inside a script block.
pub struct EmbeddedObjectMatcher {
    binding: Regex,
}

impl EmbeddedObjectMatcher {
    pub fn new(bindings: &[&str]) -> Self {
        let names = bindings
            .iter()
            .map(|b| regex::escape(b))
            .collect::<Vec<_>>()
            .join("|");
        let binding = Regex::new(&format!(r"(?i)\b({})\s*[:=]\s*\{{", names))
            .expect("escaped binding names form a valid pattern");
        Self { binding }
    }

    fn decode(&self, block: &str, index: usize) -> Vec<Result<Value, MalformedFragment>> {
        self.binding
            .captures_iter(block)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
                let malformed = |reason: String| MalformedFragment {
                    binding: name.clone(),
                    block: index,
                    reason,
                };
                let Some(literal) = object_literal(block, whole.end() - 1) else {
                    return Some(Err(malformed("unterminated object".to_string())));
                };
                Some(serde_json::from_str(literal).map_err(|e| malformed(e.to_string())))
            })
            .collect()
    }
}

impl Matcher for EmbeddedObjectMatcher {
    fn name(&self) -> &'static str {
        "embedded-object"
    }

    fn find(&self, page: &str) -> StreamMap {
        for (index, block) in script_blocks(page).into_iter().enumerate() {
            for decoded in self.decode(block, index) {
                match decoded {
                    Ok(params) => {
                        let streams = streams_from_params(&params);
                        if !streams.is_empty() {
                            return streams;
                        }
                    }
                    Err(fragment) => tracing::warn!("Skipping {}", fragment),
                }
            }
        }
        StreamMap::new()
    }
}

/// Collect every stream the parameter object describes.
fn streams_from_params(params: &Value) -> StreamMap {
    let mut streams = StreamMap::new();

    if let Some(urls) = params.get("urls").and_then(Value::as_object) {
        for (key, url) in urls {
            let Some(url) = url.as_str().map(clean_url).filter(|u| looks_like_url(u)) else {
                continue;
            };
            let label = label_from_key(key).unwrap_or_else(|| fallback_label(&url).to_string());
            streams.insert(&label, &url);
        }
    }

    match params.get("sources") {
        Some(Value::Array(sources)) => {
            for source in sources {
                let src = source.get("src").and_then(Value::as_str);
                let mime = source.get("type").and_then(Value::as_str);
                let (Some(src), Some(container)) = (src, mime.and_then(Container::from_type))
                else {
                    continue;
                };
                let label = source
                    .get("label")
                    .and_then(Value::as_str)
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or(container.default_label());
                streams.insert(label, &clean_url(src));
            }
        }
        Some(Value::Object(sources)) => insert_url_map(&mut streams, sources),
        _ => {}
    }

    for (field, label) in [(HLS, HLS), (DASH, DASH)] {
        if let Some(url) = params.get(field).and_then(Value::as_str) {
            streams.insert(label, &clean_url(url));
        }
    }

    if let Some(videos) = params.pointer("/metadata/videos").and_then(Value::as_array) {
        for video in videos {
            let Some(url) = video
                .get("url")
                .and_then(Value::as_str)
                .map(clean_url)
                .filter(|u| !u.is_empty())
            else {
                continue;
            };
            match video.get("name").and_then(Value::as_str) {
                Some(name) if !name.trim().is_empty() => {
                    streams.insert(name, &url);
                }
                _ => {
                    streams.insert_synthetic("auto", &url);
                }
            }
        }
    }

    if let Some(sources) = params
        .pointer("/player/playlist/0/sources")
        .and_then(Value::as_object)
    {
        insert_url_map(&mut streams, sources);
    }

    streams
}

/// `label → url` object, keeping only recognised containers.
fn insert_url_map(streams: &mut StreamMap, map: &serde_json::Map<String, Value>) {
    for (key, url) in map {
        let Some(url) = url.as_str().map(clean_url) else {
            continue;
        };
        if Container::from_url(&url).is_none() {
            continue;
        }
        let label = label_from_key(key).unwrap_or_else(|| fallback_label(&url).to_string());
        streams.insert(&label, &url);
    }
}

// ---------------------------------------------------------------------------
// Inline patterns
// ---------------------------------------------------------------------------

/// Regex scan for `"url720": "https://...mp4"` style pairs anywhere in the
/// page, falling back to any quoted MP4 URL.
pub struct InlinePatternMatcher;

impl Matcher for InlinePatternMatcher {
    fn name(&self) -> &'static str {
        "inline-pattern"
    }

    fn find(&self, page: &str) -> StreamMap {
        let mut streams = StreamMap::new();

        for caps in KEYED_URL_RE.captures_iter(page) {
            let url = clean_url(&caps[2]);
            let label = label_from_key(&caps[1]).unwrap_or_else(|| fallback_label(&url).to_string());
            streams.insert(&label, &url);
        }
        if !streams.is_empty() {
            return streams;
        }

        for caps in BARE_MP4_RE.captures_iter(page) {
            streams.insert_synthetic("auto", &clean_url(&caps[1]));
        }
        streams
    }
}

// ---------------------------------------------------------------------------
// Manifest recovery
// ---------------------------------------------------------------------------

/// First absolute HLS manifest URL on the page, under the `hls` label.
pub struct ManifestMatcher;

impl Matcher for ManifestMatcher {
    fn name(&self) -> &'static str {
        "manifest-recovery"
    }

    fn stage(&self) -> Stage {
        Stage::Supplement
    }

    fn find(&self, page: &str) -> StreamMap {
        let mut streams = StreamMap::new();
        if let Some(m) = MANIFEST_RE.find(page) {
            streams.insert(HLS, &clean_url(m.as_str()));
        }
        streams
    }
}
