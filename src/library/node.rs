//! Library tree node model.
//!
//! The tree is exactly four levels deep below an implicit root:
//! `Letter -> Artist -> Album -> Track`. Nodes live in an arena owned by
//! [`LibraryIndex`](super::index::LibraryIndex) and refer to each other by
//! [`NodeId`], so identifiers held by the filter and view layers stay valid
//! while the tree grows.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

/// Structured metadata for one playable file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrackRecord {
    pub absolute_path: PathBuf,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub title: String,
    pub disc_number: i32,
    pub year: i32,
}

impl TrackRecord {
    /// Artist used for grouping: the album artist when set, otherwise the track artist.
    pub fn effective_artist(&self) -> &str {
        if self.album_artist.trim().is_empty() {
            &self.artist
        } else {
            &self.album_artist
        }
    }
}

/// Letter used to group an artist: its first character, upper-cased.
/// Artists starting with anything other than a letter share the `#` group.
pub fn letter_for_artist(artist: &str) -> char {
    match artist.trim().chars().next() {
        Some(first) if first.is_alphabetic() => first.to_uppercase().next().unwrap_or(first),
        _ => '#',
    }
}

/// Stable arena identifier of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Decoded cover art held at buffer resolution, with the edge it is currently
/// displayed at.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pixels: Arc<RgbaImage>,
    display_edge: u32,
}

impl CoverImage {
    pub fn new(pixels: Arc<RgbaImage>, display_edge: u32) -> Self {
        Self {
            pixels,
            display_edge,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn display_edge(&self) -> u32 {
        self.display_edge
    }

    /// Changes the displayed size only; the buffered pixels are untouched.
    pub fn set_display_edge(&mut self, edge: u32) {
        self.display_edge = edge;
    }
}

#[derive(Debug, Clone)]
pub struct AlbumNode {
    pub name: String,
    pub year: i32,
    pub disc_number: i32,
    pub cover_path: Option<PathBuf>,
    /// Populated only when an ancestor is expanded. `None` means "not loaded
    /// yet", never "no artwork".
    pub cover_image: Option<CoverImage>,
}

#[derive(Debug, Clone)]
pub struct TrackNode {
    pub title: String,
    pub absolute_path: PathBuf,
    pub disc_number: i32,
    pub year: i32,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Letter { character: char },
    Artist { name: String },
    Album(AlbumNode),
    Track(TrackNode),
}

/// One element of the library tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    display_text: String,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        let display_text = match &kind {
            NodeKind::Letter { character } => character.to_string(),
            NodeKind::Artist { name } => name.clone(),
            NodeKind::Album(album) => album.name.clone(),
            NodeKind::Track(track) => track.title.clone(),
        };
        Self {
            kind,
            parent,
            children: Vec::new(),
            display_text,
        }
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_letter(&self) -> bool {
        matches!(self.kind, NodeKind::Letter { .. })
    }

    pub fn as_album(&self) -> Option<&AlbumNode> {
        match &self.kind {
            NodeKind::Album(album) => Some(album),
            _ => None,
        }
    }

    pub fn as_album_mut(&mut self) -> Option<&mut AlbumNode> {
        match &mut self.kind {
            NodeKind::Album(album) => Some(album),
            _ => None,
        }
    }

    pub fn as_track(&self) -> Option<&TrackNode> {
        match &self.kind {
            NodeKind::Track(track) => Some(track),
            _ => None,
        }
    }

    /// Case-insensitive ordering key used when sorting siblings.
    pub(crate) fn sort_key(&self) -> String {
        self.display_text.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_artist_falls_back_to_track_artist() {
        let mut record = TrackRecord {
            artist: "Nina Simone".to_string(),
            ..TrackRecord::default()
        };
        assert_eq!(record.effective_artist(), "Nina Simone");

        record.album_artist = "Various Artists".to_string();
        assert_eq!(record.effective_artist(), "Various Artists");

        record.album_artist = "   ".to_string();
        assert_eq!(record.effective_artist(), "Nina Simone");
    }

    #[test]
    fn test_letter_for_artist_case_folds_and_groups_symbols() {
        assert_eq!(letter_for_artist("abba"), 'A');
        assert_eq!(letter_for_artist("Ödland"), 'Ö');
        assert_eq!(letter_for_artist("2Pac"), '#');
        assert_eq!(letter_for_artist(""), '#');
    }
}
