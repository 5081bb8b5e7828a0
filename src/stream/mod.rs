//! Stream discovery: player page parsing, caching and quality resolution

pub mod cache;
pub mod extractor;
pub mod fetcher;
pub mod map;
pub mod matchers;
pub mod resolver;

pub use cache::StreamCache;
pub use extractor::StreamExtractor;
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use map::StreamMap;
pub use resolver::{resolve, Resolution};
