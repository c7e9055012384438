//! Track metadata readers. The default reader is backed by `lofty`.

use std::path::Path;

use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};

use crate::error::MetadataError;
use crate::library::node::TrackRecord;
use crate::media_file_discovery::is_supported_audio_file;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Extracts a [`TrackRecord`] from one file on disk.
///
/// Implementations are shared with the scan worker thread.
pub trait MetadataReader: Send + Sync {
    fn read_track(&self, path: &Path) -> Result<TrackRecord, MetadataError>;
}

/// Reads tags with `lofty`, filling gaps with readable fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyMetadataReader;

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], mut extractor: F) -> String
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(|tag| extractor(tag))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Leading digits of a tag value, e.g. `"1998-10-31"` -> 1998, `"2/3"` -> 2.
fn leading_number(value: &str) -> i32 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn derive_year_from_date(date: &str) -> i32 {
    let year: String = date.trim().chars().take(4).collect();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        leading_number(&year)
    } else {
        0
    }
}

pub fn fallback_title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "Unknown Title".to_string())
}

impl MetadataReader for LoftyMetadataReader {
    fn read_track(&self, path: &Path) -> Result<TrackRecord, MetadataError> {
        if !is_supported_audio_file(path) {
            return Err(MetadataError::Unsupported(path.to_path_buf()));
        }
        let tagged_file = read_from_path(path)
            .map_err(|err| MetadataError::Unreadable(path.to_path_buf(), err.to_string()))?;
        let primary_tag = tagged_file.primary_tag();
        let tags = tagged_file.tags();

        let title = first_non_empty_value(primary_tag, tags, |tag| {
            tag.title().map(|value| value.into_owned())
        });
        let artist = first_non_empty_value(primary_tag, tags, |tag| {
            tag.artist().map(|value| value.into_owned())
        });
        let album_artist = first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(&ItemKey::AlbumArtist).map(str::to_string)
        });
        let album = first_non_empty_value(primary_tag, tags, |tag| {
            tag.album().map(|value| value.into_owned())
        });
        let year = {
            let direct = first_non_empty_value(primary_tag, tags, |tag| {
                tag.get_string(&ItemKey::Year).map(str::to_string)
            });
            if direct.is_empty() {
                let date = first_non_empty_value(primary_tag, tags, |tag| {
                    tag.get_string(&ItemKey::RecordingDate).map(str::to_string)
                });
                derive_year_from_date(&date)
            } else {
                leading_number(&direct)
            }
        };
        let disc_number = leading_number(&first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(&ItemKey::DiscNumber)
                .map(str::to_string)
                .or_else(|| tag.disk().map(|value| value.to_string()))
        }));

        Ok(TrackRecord {
            absolute_path: path.to_path_buf(),
            artist: if artist.is_empty() {
                UNKNOWN_ARTIST.to_string()
            } else {
                artist
            },
            album_artist,
            album: if album.is_empty() {
                UNKNOWN_ALBUM.to_string()
            } else {
                album
            },
            title: if title.is_empty() {
                fallback_title_from_path(path)
            } else {
                title
            },
            disc_number,
            year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_derive_year_from_date_with_full_value() {
        assert_eq!(derive_year_from_date("1998-10-31"), 1998);
    }

    #[test]
    fn test_derive_year_from_date_with_short_value() {
        assert_eq!(derive_year_from_date("99"), 0);
        assert_eq!(derive_year_from_date("19xx"), 0);
    }

    #[test]
    fn test_leading_number_handles_totals() {
        assert_eq!(leading_number("2/3"), 2);
        assert_eq!(leading_number(" 1 "), 1);
        assert_eq!(leading_number("side A"), 0);
    }

    #[test]
    fn test_fallback_title_uses_file_stem() {
        assert_eq!(fallback_title_from_path(Path::new("/m/01 Intro.flac")), "01 Intro");
    }

    #[test]
    fn test_lofty_reader_rejects_unsupported_extension() {
        let result = LoftyMetadataReader.read_track(Path::new("/m/cover.jpg"));
        assert!(matches!(result, Err(MetadataError::Unsupported(_))));
    }

    #[test]
    fn test_lofty_reader_reports_garbage_as_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        fs::write(&path, b"definitely not audio").unwrap();
        let result = LoftyMetadataReader.read_track(&path);
        assert!(matches!(result, Err(MetadataError::Unreadable(_, _))));
    }
}
