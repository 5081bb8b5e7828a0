//! API client module for VK

pub mod client;
pub mod video;

pub use client::{ApiClient, HttpApiTransport};
pub use video::{search_query, search_videos, DEFAULT_SEARCH_LIMIT};
