use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 7] =
    ["mp3", "wav", "ogg", "flac", "aac", "m4a", "mp4"];

pub const SUPPORTED_COVER_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

pub fn is_supported_audio_file(path: &Path) -> bool {
    has_extension(path, &SUPPORTED_AUDIO_EXTENSIONS)
}

pub fn is_cover_image_file(path: &Path) -> bool {
    has_extension(path, &SUPPORTED_COVER_EXTENSIONS)
}

/// Files found below one music folder, each list sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LibraryFiles {
    pub tracks: Vec<PathBuf>,
    pub covers: Vec<PathBuf>,
}

/// Walks `folder_path`, checking `should_stop` before each directory entry.
/// Returns `None` as soon as it answers true.
pub fn collect_library_files(
    folder_path: &Path,
    should_stop: impl Fn() -> bool,
) -> Option<LibraryFiles> {
    let mut files = LibraryFiles::default();
    for entry in WalkDir::new(folder_path).follow_links(true) {
        if should_stop() {
            return None;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(
                    "Failed to read an entry below {}: {}",
                    folder_path.display(),
                    err
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if is_supported_audio_file(&path) {
            files.tracks.push(path);
        } else if is_cover_image_file(&path) {
            files.covers.push(path);
        }
    }
    files.tracks.sort_unstable();
    files.covers.sort_unstable();
    Some(files)
}
