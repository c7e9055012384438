//! Lazy cover loading for expanded albums.
//!
//! Covers are decoded at a buffer resolution above the display size so the
//! display size can change without touching the disk. The buffer follows the
//! display size in fixed increments with hysteresis.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use log::debug;
use lru::LruCache;

use super::index::LibraryIndex;
use super::node::{CoverImage, Node, NodeId};
use crate::config::CoverConfig;
use crate::image_pipeline::load_cover_at_edge;

pub struct CoverCache {
    show_covers: bool,
    cover_size: u32,
    buffered_cover_size: u32,
    buffer_increment: u32,
    /// Failed decodes are remembered too, so a broken file is read once.
    decoded: LruCache<PathBuf, Option<Arc<RgbaImage>>>,
}

impl CoverCache {
    pub fn new(config: &CoverConfig) -> Self {
        let capacity = NonZeroUsize::new(config.decoded_cache_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            show_covers: config.show_covers,
            cover_size: config.cover_size,
            buffered_cover_size: config.buffered_cover_size,
            buffer_increment: config.buffer_increment.max(1),
            decoded: LruCache::new(capacity),
        }
    }

    pub fn show_covers(&self) -> bool {
        self.show_covers
    }

    pub fn cover_size(&self) -> u32 {
        self.cover_size
    }

    pub fn buffered_cover_size(&self) -> u32 {
        self.buffered_cover_size
    }

    fn decode(&mut self, path: &Path) -> Option<Arc<RgbaImage>> {
        if let Some(cached) = self.decoded.get(path) {
            return cached.clone();
        }
        let loaded = load_cover_at_edge(path, self.buffered_cover_size).map(Arc::new);
        self.decoded.put(path.to_path_buf(), loaded.clone());
        loaded
    }

    /// Loads the cover of each album in `albums` that has a cover path but no
    /// image yet. Returns how many images were attached.
    pub fn resolve_covers(&mut self, index: &mut LibraryIndex, albums: &[NodeId]) -> usize {
        if !self.show_covers {
            return 0;
        }
        let mut attached = 0;
        for album_id in albums {
            let cover_path = match index.node(*album_id).and_then(Node::as_album) {
                Some(album) if album.cover_image.is_none() => album.cover_path.clone(),
                _ => None,
            };
            let Some(cover_path) = cover_path else {
                continue;
            };
            let Some(pixels) = self.decode(&cover_path) else {
                continue;
            };
            if let Some(album) = index.node_mut(*album_id).and_then(Node::as_album_mut) {
                album.cover_image = Some(CoverImage::new(pixels, self.cover_size));
                attached += 1;
            }
        }
        if attached > 0 {
            debug!("Attached {} cover image(s)", attached);
        }
        attached
    }

    /// Changes the display size and moves the buffer resolution by whole
    /// increments: up while the display size reaches the buffer, down while
    /// the display size sits more than one increment below it.
    ///
    /// Returns true when the buffer moved. Every decoded cover is then dropped
    /// and must be resolved again; otherwise loaded covers are only rescaled.
    pub fn set_cover_size(&mut self, index: &mut LibraryIndex, new_size: u32) -> bool {
        // The buffer must stay representable one increment above the display size.
        let new_size = new_size.min(u32::MAX - self.buffer_increment).max(1);
        let mut buffered = self.buffered_cover_size;
        while new_size >= buffered {
            buffered = buffered.saturating_add(self.buffer_increment);
        }
        while new_size.saturating_add(self.buffer_increment) < buffered {
            buffered -= self.buffer_increment;
        }

        self.cover_size = new_size;
        let buffer_changed = buffered != self.buffered_cover_size;
        if buffer_changed {
            debug!(
                "Cover buffer resolution {} -> {}",
                self.buffered_cover_size, buffered
            );
            self.buffered_cover_size = buffered;
            self.decoded.clear();
        }

        for album_id in index.album_ids() {
            if let Some(album) = index.node_mut(album_id).and_then(Node::as_album_mut) {
                if buffer_changed {
                    album.cover_image = None;
                } else if let Some(image) = album.cover_image.as_mut() {
                    image.set_display_edge(new_size);
                }
            }
        }
        buffer_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::record;
    use image::{ImageBuffer, Rgba};
    use tempfile::tempdir;

    fn config(cover_size: u32, buffered_cover_size: u32) -> CoverConfig {
        CoverConfig {
            show_covers: true,
            cover_size,
            buffered_cover_size,
            buffer_increment: 128,
            decoded_cache_entries: 8,
        }
    }

    fn album_with_cover(dir: &Path, index: &mut LibraryIndex, edge: u32) -> NodeId {
        let cover = dir.join("cover.png");
        ImageBuffer::from_pixel(edge, edge, Rgba([200u8, 10, 10, 255]))
            .save(&cover)
            .unwrap();
        let track_path = dir.join("1.mp3");
        let track = index.insert_from_record(&record(track_path.to_str().unwrap(), "A", "X", "1", 2000));
        index.assign_cover(&cover);
        index.node(track).unwrap().parent().unwrap()
    }

    fn loaded(index: &LibraryIndex, album: NodeId) -> Option<&CoverImage> {
        index.node(album).unwrap().as_album().unwrap().cover_image.as_ref()
    }

    #[test]
    fn test_hysteresis_keeps_buffer_within_one_increment() {
        let mut index = LibraryIndex::new();
        let mut covers = CoverCache::new(&config(100, 228));

        assert!(!covers.set_cover_size(&mut index, 100 + 128 - 1));
        assert_eq!(covers.buffered_cover_size(), 228);

        assert!(covers.set_cover_size(&mut index, 100 + 128 + 1));
        assert_eq!(covers.buffered_cover_size(), 228 + 128);

        // Shrinking by less than an increment below the buffer keeps it.
        assert!(!covers.set_cover_size(&mut index, 228));
        assert_eq!(covers.buffered_cover_size(), 356);

        assert!(covers.set_cover_size(&mut index, 100));
        assert_eq!(covers.buffered_cover_size(), 228);
        assert_eq!(covers.cover_size(), 100);
    }

    #[test]
    fn test_large_jump_moves_buffer_past_display_size() {
        let mut index = LibraryIndex::new();
        let mut covers = CoverCache::new(&config(48, 128));
        covers.set_cover_size(&mut index, 600);
        assert_eq!(covers.buffered_cover_size(), 640);
        covers.set_cover_size(&mut index, 16);
        assert_eq!(covers.buffered_cover_size(), 128);
    }

    #[test]
    fn test_cover_size_upper_bound_keeps_buffer_above_display() {
        let mut index = LibraryIndex::new();
        let mut covers = CoverCache::new(&config(48, 128));
        assert!(covers.set_cover_size(&mut index, u32::MAX));
        assert_eq!(covers.cover_size(), u32::MAX - 128);
        assert!(covers.buffered_cover_size() > covers.cover_size());

        covers.set_cover_size(&mut index, 48);
        assert_eq!(covers.buffered_cover_size(), 128);
    }

    #[test]
    fn test_resolve_loads_at_buffer_resolution_and_only_once() {
        let dir = tempdir().unwrap();
        let mut index = LibraryIndex::new();
        let album = album_with_cover(dir.path(), &mut index, 500);
        let mut covers = CoverCache::new(&config(100, 228));

        assert!(loaded(&index, album).is_none());
        assert_eq!(covers.resolve_covers(&mut index, &[album]), 1);
        let image = loaded(&index, album).unwrap();
        assert_eq!(image.dimensions(), (228, 228));
        assert_eq!(image.display_edge(), 100);

        assert_eq!(covers.resolve_covers(&mut index, &[album]), 0);
    }

    #[test]
    fn test_display_rescale_without_reload() {
        let dir = tempdir().unwrap();
        let mut index = LibraryIndex::new();
        let album = album_with_cover(dir.path(), &mut index, 500);
        let mut covers = CoverCache::new(&config(100, 228));
        covers.resolve_covers(&mut index, &[album]);

        assert!(!covers.set_cover_size(&mut index, 150));
        let image = loaded(&index, album).unwrap();
        assert_eq!(image.display_edge(), 150);
        assert_eq!(image.dimensions(), (228, 228));

        assert!(covers.set_cover_size(&mut index, 300));
        assert!(loaded(&index, album).is_none());
        covers.resolve_covers(&mut index, &[album]);
        assert_eq!(loaded(&index, album).unwrap().dimensions(), (356, 356));
    }

    #[test]
    fn test_disabled_covers_and_missing_files_load_nothing() {
        let dir = tempdir().unwrap();
        let mut index = LibraryIndex::new();
        let album = album_with_cover(dir.path(), &mut index, 64);

        let mut disabled = config(100, 228);
        disabled.show_covers = false;
        assert_eq!(CoverCache::new(&disabled).resolve_covers(&mut index, &[album]), 0);

        std::fs::remove_file(dir.path().join("cover.png")).unwrap();
        let mut covers = CoverCache::new(&config(100, 228));
        assert_eq!(covers.resolve_covers(&mut index, &[album]), 0);
        assert!(loaded(&index, album).is_none());
    }
}
