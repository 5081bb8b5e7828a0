//! Data models for VK Video entities

pub mod quality;
mod video;

pub use quality::*;
pub use video::*;
