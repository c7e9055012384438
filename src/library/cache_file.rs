//! Versioned flat cache of the library tree.
//!
//! Line 1 is a JSON header carrying a signature, a format version and the
//! music folders the cache was built from. Every following line is one
//! Track leaf with its derived ancestor fields.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::index::TrackEntry;
use super::node::TrackRecord;
use crate::error::{CacheError, CacheResult};

pub const CACHE_SIGNATURE: &str = "tunetree-library";
pub const CACHE_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub signature: String,
    pub version: u32,
    #[serde(default)]
    pub roots: Vec<String>,
}

impl CacheHeader {
    pub fn current(roots: &[String]) -> Self {
        Self {
            signature: CACHE_SIGNATURE.to_string(),
            version: CACHE_VERSION,
            roots: roots.to_vec(),
        }
    }

    fn validate(&self) -> CacheResult<()> {
        if self.signature != CACHE_SIGNATURE {
            return Err(CacheError::CorruptCache(format!(
                "unexpected signature '{}'",
                self.signature
            )));
        }
        if self.version != CACHE_VERSION {
            return Err(CacheError::CorruptCache(format!(
                "unsupported version {} (expected {})",
                self.version, CACHE_VERSION
            )));
        }
        Ok(())
    }
}

/// One Track leaf, annotated with its Letter/Artist/Album ancestry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRow {
    pub letter: char,
    pub artist: String,
    pub album: String,
    pub path: PathBuf,
    pub title: String,
    pub disc: i32,
    pub year: i32,
    /// Year and disc of the album node, which come from the track that
    /// created it rather than from this row's track.
    pub album_year: i32,
    pub album_disc: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<PathBuf>,
}

impl CacheRow {
    pub fn from_entry(entry: &TrackEntry<'_>) -> Self {
        Self {
            letter: entry.letter,
            artist: entry.artist.to_string(),
            album: entry.album.name.clone(),
            path: entry.track.absolute_path.clone(),
            title: entry.track.title.clone(),
            disc: entry.track.disc_number,
            year: entry.track.year,
            album_year: entry.album.year,
            album_disc: entry.album.disc_number,
            cover: entry.album.cover_path.clone(),
        }
    }

    pub fn to_record(&self) -> TrackRecord {
        TrackRecord {
            absolute_path: self.path.clone(),
            artist: self.artist.clone(),
            album_artist: String::new(),
            album: self.album.clone(),
            title: self.title.clone(),
            disc_number: self.disc,
            year: self.year,
        }
    }
}

fn open(path: &Path) -> CacheResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| CacheError::from_io(path, err))
}

fn parse_header(line: Option<std::io::Result<String>>) -> CacheResult<CacheHeader> {
    let line = match line {
        Some(line) => line?,
        None => return Err(CacheError::CorruptCache("empty cache file".to_string())),
    };
    let header: CacheHeader = serde_json::from_str(&line)
        .map_err(|err| CacheError::CorruptCache(format!("unreadable header: {}", err)))?;
    header.validate()?;
    Ok(header)
}

/// Reads and validates only the header line.
pub fn read_header(path: &Path) -> CacheResult<CacheHeader> {
    let mut lines = open(path)?.lines();
    parse_header(lines.next())
}

/// Reads the header and every row. Any malformed row rejects the whole file.
pub fn read_cache(path: &Path) -> CacheResult<(CacheHeader, Vec<CacheRow>)> {
    let mut lines = open(path)?.lines();
    let header = parse_header(lines.next())?;
    let mut rows = Vec::new();
    for (line_number, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: CacheRow = serde_json::from_str(&line).map_err(|err| {
            CacheError::CorruptCache(format!("row {}: {}", line_number + 2, err))
        })?;
        rows.push(row);
    }
    Ok((header, rows))
}

/// Writes the cache next to `path` and renames it into place.
pub fn write_cache(path: &Path, header: &CacheHeader, rows: &[CacheRow]) -> CacheResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|err| CacheError::from_io(parent, err))?;
        }
    }
    let temp_path = path.with_extension("cache.tmp");
    {
        let file = File::create(&temp_path).map_err(|err| CacheError::from_io(&temp_path, err))?;
        let mut writer = BufWriter::new(file);
        let to_corrupt = |err: serde_json::Error| CacheError::CorruptCache(err.to_string());
        serde_json::to_writer(&mut writer, header).map_err(to_corrupt)?;
        writer.write_all(b"\n")?;
        for row in rows {
            serde_json::to_writer(&mut writer, row).map_err(to_corrupt)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&temp_path, path).map_err(|err| CacheError::from_io(path, err))?;
    Ok(())
}
