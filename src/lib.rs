//! Music library tree: scanning, caching, filtering and lazy cover loading
//! for a `Letter -> Artist -> Album -> Track` browser.

pub mod config;
pub mod config_persistence;
pub mod error;
pub mod image_pipeline;
pub mod library;
pub mod media_file_discovery;
pub mod metadata_tags;
pub mod protocol;
