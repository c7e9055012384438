//! Persistent library configuration model and defaults.

use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "tunetree";
const MIN_COVER_EDGE_PX: u32 = 16;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Music location and cache placement.
    pub library: LibraryConfig,
    #[serde(default)]
    /// Cover art display and buffering.
    pub covers: CoverConfig,
    #[serde(default)]
    /// Background scan behavior.
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub folders: Vec<String>,
    /// Overrides the default cache location under the user data directory.
    #[serde(default)]
    pub cache_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CoverConfig {
    #[serde(default = "default_true")]
    pub show_covers: bool,
    /// Edge length covers are displayed at.
    #[serde(default = "default_cover_size")]
    pub cover_size: u32,
    /// Edge length covers are decoded at, kept above `cover_size`.
    #[serde(default = "default_buffered_cover_size")]
    pub buffered_cover_size: u32,
    #[serde(default = "default_buffer_increment")]
    pub buffer_increment: u32,
    #[serde(default = "default_decoded_cache_entries")]
    pub decoded_cache_entries: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScanConfig {
    #[serde(default = "default_progress_updates_per_second")]
    pub progress_updates_per_second: u32,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            show_covers: true,
            cover_size: default_cover_size(),
            buffered_cover_size: default_buffered_cover_size(),
            buffer_increment: default_buffer_increment(),
            decoded_cache_entries: default_decoded_cache_entries(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            progress_updates_per_second: default_progress_updates_per_second(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cover_size() -> u32 {
    48
}

fn default_buffered_cover_size() -> u32 {
    128
}

fn default_buffer_increment() -> u32 {
    128
}

fn default_decoded_cache_entries() -> usize {
    64
}

fn default_progress_updates_per_second() -> u32 {
    10
}

impl LibraryConfig {
    /// The cache file to read and write: the override if set, else the default.
    pub fn cache_path(&self) -> Option<PathBuf> {
        match self.cache_file.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => default_cache_path(),
        }
    }

    /// Configured folders as paths, blank entries skipped.
    pub fn folder_paths(&self) -> Vec<PathBuf> {
        self.folders
            .iter()
            .map(|folder| folder.trim())
            .filter(|folder| !folder.is_empty())
            .map(PathBuf::from)
            .collect()
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(APP_DIR_NAME).join("config.toml"))
}

pub fn default_cache_path() -> Option<PathBuf> {
    dirs::data_dir().map(|path| path.join(APP_DIR_NAME).join("library.cache"))
}

/// Clamps loaded values into ranges the library can work with.
pub fn sanitize_config(config: Config) -> Config {
    let buffer_increment = config.covers.buffer_increment.max(1);
    let cover_size = config.covers.cover_size.max(MIN_COVER_EDGE_PX);
    let buffered_cover_size = if config.covers.buffered_cover_size > cover_size {
        config.covers.buffered_cover_size
    } else {
        cover_size.saturating_add(buffer_increment)
    };

    Config {
        library: LibraryConfig {
            folders: config
                .library
                .folders
                .into_iter()
                .map(|folder| folder.trim().to_string())
                .filter(|folder| !folder.is_empty())
                .collect(),
            cache_file: config.library.cache_file,
        },
        covers: CoverConfig {
            show_covers: config.covers.show_covers,
            cover_size,
            buffered_cover_size,
            buffer_increment,
            decoded_cache_entries: config.covers.decoded_cache_entries.max(1),
        },
        scan: ScanConfig {
            progress_updates_per_second: config.scan.progress_updates_per_second.max(1),
        },
    }
}
