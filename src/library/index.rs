//! Hierarchical in-memory library index.
//!
//! Owns every node of the `Letter -> Artist -> Album -> Track` tree. Nodes
//! are stored in an arena and addressed by [`NodeId`]; children are kept in
//! insertion order until [`LibraryIndex::sort`] is called, so a scan of
//! thousands of files does not pay for a re-sort per insertion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::cache_file::{self, CacheHeader, CacheRow};
use super::node::{letter_for_artist, AlbumNode, Node, NodeId, NodeKind, TrackNode, TrackRecord};
use crate::error::CacheResult;

/// Lookup key for the find-or-create chain. Tracks are never looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Letter(char),
    Artist(String),
    Album(String),
}

/// A Track leaf seen together with its derived ancestors.
#[derive(Debug, Clone, Copy)]
pub struct TrackEntry<'a> {
    pub id: NodeId,
    pub letter: char,
    pub artist: &'a str,
    pub album: &'a AlbumNode,
    pub track: &'a TrackNode,
}

impl TrackEntry<'_> {
    /// Rebuilds the record this leaf was inserted from. The album artist is
    /// folded into `artist`, which is what the tree groups by.
    pub fn to_record(&self) -> TrackRecord {
        TrackRecord {
            absolute_path: self.track.absolute_path.clone(),
            artist: self.artist.to_string(),
            album_artist: String::new(),
            album: self.album.name.clone(),
            title: self.track.title.clone(),
            disc_number: self.track.disc_number,
            year: self.track.year,
        }
    }
}

#[derive(Debug, Default)]
pub struct LibraryIndex {
    nodes: Vec<Option<Node>>,
    roots: Vec<NodeId>,
    lookup: HashMap<(Option<NodeId>, ChildKey), NodeId>,
    tracks_by_path: HashMap<PathBuf, Vec<NodeId>>,
    albums_by_dir: HashMap<PathBuf, Vec<NodeId>>,
    covers_by_dir: HashMap<PathBuf, PathBuf>,
}

fn is_preferred_cover_name(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| {
            let stem = stem.to_ascii_lowercase();
            ["cover", "folder", "front"]
                .iter()
                .any(|hint| stem.contains(hint))
        })
        .unwrap_or(false)
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroys the whole tree. Every previously handed out [`NodeId`] becomes stale.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.lookup.clear();
        self.tracks_by_path.clear();
        self.albums_by_dir.clear();
        self.covers_by_dir.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.tracks_by_path.values().map(Vec::len).sum()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Children of `parent`, or the Letter nodes when `parent` is `None`.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self.node(id).map(Node::children).unwrap_or(&[]),
        }
    }

    /// Resolves a row path from the root (`[letter_row, artist_row, ...]`).
    pub fn node_at(&self, address: &[usize]) -> Option<NodeId> {
        let mut parent = None;
        for row in address {
            parent = Some(*self.children(parent).get(*row)?);
        }
        parent
    }

    /// Row path from the root to `id`; inverse of [`LibraryIndex::node_at`].
    pub fn address_of(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut address = Vec::new();
        let mut current = id;
        loop {
            let node = self.node(current)?;
            let row = self
                .children(node.parent)
                .iter()
                .position(|child| *child == current)?;
            address.push(row);
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        address.reverse();
        Some(address)
    }

    pub fn find_by_path(&self, absolute_path: &Path) -> Option<NodeId> {
        self.tracks_by_path
            .get(absolute_path)
            .and_then(|ids| ids.first().copied())
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(kind, parent)));
        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = self.node_mut(parent_id) {
                    parent_node.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    fn find_or_create(
        &mut self,
        parent: Option<NodeId>,
        key: ChildKey,
        make: impl FnOnce() -> NodeKind,
    ) -> NodeId {
        if let Some(existing) = self.lookup.get(&(parent, key.clone())) {
            return *existing;
        }
        let id = self.alloc(make(), parent);
        self.lookup.insert((parent, key), id);
        id
    }

    /// Inserts one track, creating any missing Letter, Artist and Album
    /// ancestors. Returns the new Track leaf.
    pub fn insert_from_record(&mut self, record: &TrackRecord) -> NodeId {
        self.insert_with_cover(record, None)
    }

    pub(crate) fn insert_with_cover(
        &mut self,
        record: &TrackRecord,
        cover_path: Option<PathBuf>,
    ) -> NodeId {
        let artist = record.effective_artist().to_string();
        let character = letter_for_artist(&artist);

        let letter = self.find_or_create(None, ChildKey::Letter(character), || {
            NodeKind::Letter { character }
        });
        let artist_id = self.find_or_create(
            Some(letter),
            ChildKey::Artist(artist.clone()),
            || NodeKind::Artist { name: artist },
        );
        let album_id = self.find_or_create(
            Some(artist_id),
            ChildKey::Album(record.album.clone()),
            || {
                NodeKind::Album(AlbumNode {
                    name: record.album.clone(),
                    year: record.year,
                    disc_number: record.disc_number,
                    cover_path: None,
                    cover_image: None,
                })
            },
        );

        let track_id = self.alloc(
            NodeKind::Track(TrackNode {
                title: record.title.clone(),
                absolute_path: record.absolute_path.clone(),
                disc_number: record.disc_number,
                year: record.year,
            }),
            Some(album_id),
        );
        self.tracks_by_path
            .entry(record.absolute_path.clone())
            .or_default()
            .push(track_id);

        let mut dir_cover = None;
        if let Some(dir) = record.absolute_path.parent() {
            let albums = self.albums_by_dir.entry(dir.to_path_buf()).or_default();
            if !albums.contains(&album_id) {
                albums.push(album_id);
            }
            dir_cover = self.covers_by_dir.get(dir).cloned();
        }
        if let Some(album) = self.node_mut(album_id).and_then(Node::as_album_mut) {
            if album.cover_path.is_none() {
                album.cover_path = cover_path.or(dir_cover);
            }
        }
        track_id
    }

    /// Records a cover image found during a scan and hands it to every album
    /// with a track in the same directory.
    pub fn assign_cover(&mut self, cover_path: &Path) {
        let Some(dir) = cover_path.parent().map(Path::to_path_buf) else {
            return;
        };
        let keep_existing = self
            .covers_by_dir
            .get(&dir)
            .is_some_and(|existing| is_preferred_cover_name(existing))
            && !is_preferred_cover_name(cover_path);
        if keep_existing {
            return;
        }
        self.covers_by_dir
            .insert(dir.clone(), cover_path.to_path_buf());

        let album_ids = self.albums_by_dir.get(&dir).cloned().unwrap_or_default();
        for album_id in album_ids {
            if let Some(album) = self.node_mut(album_id).and_then(Node::as_album_mut) {
                let same_dir = album
                    .cover_path
                    .as_deref()
                    .and_then(Path::parent)
                    .is_some_and(|parent| parent == dir);
                if album.cover_path.is_none() || same_dir {
                    if album.cover_path.as_deref() != Some(cover_path) {
                        album.cover_image = None;
                    }
                    album.cover_path = Some(cover_path.to_path_buf());
                }
            }
        }
    }

    /// Sorts every sibling list, case-insensitively by display text.
    pub fn sort(&mut self) {
        let mut roots = std::mem::take(&mut self.roots);
        self.sort_ids(&mut roots);
        self.roots = roots;

        for slot in 0..self.nodes.len() {
            let Some(mut children) = self.nodes[slot]
                .as_mut()
                .map(|node| std::mem::take(&mut node.children))
            else {
                continue;
            };
            self.sort_ids(&mut children);
            if let Some(node) = self.nodes[slot].as_mut() {
                node.children = children;
            }
        }
    }

    fn sort_ids(&self, ids: &mut [NodeId]) {
        ids.sort_by_cached_key(|id| {
            self.node(*id)
                .map(|node| (node.sort_key(), node.display_text().to_string()))
                .unwrap_or_default()
        });
    }

    /// Track leaves in pre-order, each with its derived ancestors.
    pub fn track_entries(&self) -> Vec<TrackEntry<'_>> {
        let mut entries = Vec::with_capacity(self.track_count());
        for letter_id in &self.roots {
            let Some(letter) = self.node(*letter_id) else {
                continue;
            };
            let NodeKind::Letter { character } = letter.kind else {
                continue;
            };
            for artist_id in letter.children() {
                let Some(artist) = self.node(*artist_id) else {
                    continue;
                };
                let NodeKind::Artist { name: artist_name } = &artist.kind else {
                    continue;
                };
                for album_id in artist.children() {
                    let Some(album_node) = self.node(*album_id) else {
                        continue;
                    };
                    let Some(album) = album_node.as_album() else {
                        continue;
                    };
                    for track_id in album_node.children() {
                        if let Some(track) = self.node(*track_id).and_then(Node::as_track) {
                            entries.push(TrackEntry {
                                id: *track_id,
                                letter: character,
                                artist: artist_name,
                                album,
                                track,
                            });
                        }
                    }
                }
            }
        }
        entries
    }

    /// Every live Album node.
    pub fn album_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| {
                node.as_ref()
                    .filter(|node| node.as_album().is_some())
                    .map(|_| NodeId(slot))
            })
            .collect()
    }

    /// Album nodes shown when `id` is expanded: the children of an artist,
    /// or the album itself. Letters and tracks yield nothing.
    pub fn albums_under(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        match node.kind {
            NodeKind::Artist { .. } => node
                .children()
                .iter()
                .copied()
                .filter(|child| self.node(*child).and_then(Node::as_album).is_some())
                .collect(),
            NodeKind::Album(_) => vec![id],
            NodeKind::Letter { .. } | NodeKind::Track(_) => Vec::new(),
        }
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).and_then(Node::parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).and_then(Node::parent);
        }
        chain
    }

    fn detach(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        match node.parent {
            Some(parent) => {
                if let Some(parent_node) = self.node_mut(parent) {
                    parent_node.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }
        let key = match &node.kind {
            NodeKind::Letter { character } => Some(ChildKey::Letter(*character)),
            NodeKind::Artist { name } => Some(ChildKey::Artist(name.clone())),
            NodeKind::Album(album) => Some(ChildKey::Album(album.name.clone())),
            NodeKind::Track(_) => None,
        };
        if let Some(key) = key {
            self.lookup.remove(&(node.parent, key));
        }
        if node.as_album().is_some() {
            for albums in self.albums_by_dir.values_mut() {
                albums.retain(|album| *album != id);
            }
        }
        Some(node)
    }

    /// Removes one Track leaf and any ancestors it leaves without children.
    fn remove_track_node(&mut self, id: NodeId) {
        let Some(node) = self.detach(id) else {
            return;
        };
        if let Some(track) = node.as_track() {
            if let Some(ids) = self.tracks_by_path.get_mut(&track.absolute_path) {
                ids.retain(|track_id| *track_id != id);
                if ids.is_empty() {
                    self.tracks_by_path.remove(&track.absolute_path);
                }
            }
        }
        let mut current = node.parent;
        while let Some(parent) = current {
            let is_empty = self
                .node(parent)
                .is_some_and(|parent_node| parent_node.children.is_empty());
            if !is_empty {
                break;
            }
            current = self.node(parent).and_then(Node::parent);
            self.detach(parent);
        }
    }

    /// Removes every Track leaf for `absolute_path`. Returns how many were removed.
    pub fn remove_track(&mut self, absolute_path: &Path) -> usize {
        let ids = self
            .tracks_by_path
            .get(absolute_path)
            .cloned()
            .unwrap_or_default();
        for id in &ids {
            self.remove_track_node(*id);
        }
        ids.len()
    }

    /// Drops Track leaves whose file is gone from disk, and ancestors left empty.
    pub fn prune_missing(&mut self) -> usize {
        let missing: Vec<PathBuf> = self
            .tracks_by_path
            .keys()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        let removed: usize = missing.iter().map(|path| self.remove_track(path)).sum();
        if removed > 0 {
            info!("Pruned {} missing track(s) from the library", removed);
        }
        removed
    }

    /// Replaces the tree with the contents of a cache file.
    pub fn load_from_file(&mut self, path: &Path) -> CacheResult<CacheHeader> {
        let (header, rows) = cache_file::read_cache(path)?;
        self.clear();
        for row in &rows {
            let cover = row.cover.clone();
            let track_id = self.insert_with_cover(&row.to_record(), cover);
            let album_id = self.node(track_id).and_then(Node::parent);
            if let Some(album) = album_id
                .and_then(|id| self.node_mut(id))
                .and_then(Node::as_album_mut)
            {
                album.year = row.album_year;
                album.disc_number = row.album_disc;
            }
        }
        info!(
            "Loaded {} track(s) from library cache {}",
            rows.len(),
            path.display()
        );
        Ok(header)
    }

    /// Writes one row per Track leaf, in pre-order, under a header naming `roots`.
    pub fn save_to_file(&self, path: &Path, roots: &[String]) -> CacheResult<()> {
        let rows: Vec<CacheRow> = self
            .track_entries()
            .iter()
            .map(CacheRow::from_entry)
            .collect();
        cache_file::write_cache(path, &CacheHeader::current(roots), &rows)?;
        debug!("Saved {} track(s) to {}", rows.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::record;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::fs::File;
    use tempfile::tempdir;

    fn display(index: &LibraryIndex, id: NodeId) -> String {
        index.node(id).unwrap().display_text().to_string()
    }

    fn shape(index: &LibraryIndex) -> BTreeSet<(char, String, String, String, PathBuf)> {
        index
            .track_entries()
            .iter()
            .map(|entry| {
                (
                    entry.letter,
                    entry.artist.to_string(),
                    entry.album.name.clone(),
                    entry.track.title.clone(),
                    entry.track.absolute_path.clone(),
                )
            })
            .collect()
    }

    fn album_fields(index: &LibraryIndex) -> BTreeSet<(String, String, i32, i32)> {
        index
            .track_entries()
            .iter()
            .map(|entry| {
                (
                    entry.artist.to_string(),
                    entry.album.name.clone(),
                    entry.album.year,
                    entry.album.disc_number,
                )
            })
            .collect()
    }

    #[test]
    fn test_insert_builds_four_levels() {
        let mut index = LibraryIndex::new();
        let song = record("/m/a/x/1.mp3", "Abba", "Arrival", "Dancing Queen", 1976);
        let track = index.insert_from_record(&song);

        let ancestors = index.ancestors(track);
        assert_eq!(ancestors.len(), 3);
        assert_eq!(display(&index, ancestors[0]), "Arrival");
        assert_eq!(display(&index, ancestors[1]), "Abba");
        assert_eq!(display(&index, ancestors[2]), "A");
        assert!(index.node(ancestors[2]).unwrap().is_letter());
        assert_eq!(index.track_count(), 1);
    }

    #[test]
    fn test_duplicate_insert_appends_track_under_same_album() {
        let mut index = LibraryIndex::new();
        let song = record("/m/a/x/1.mp3", "Abba", "Arrival", "Dancing Queen", 1976);
        let first = index.insert_from_record(&song);
        let second = index.insert_from_record(&song);

        assert_ne!(first, second);
        assert_eq!(index.children(None).len(), 1);
        let album = index.node(first).unwrap().parent().unwrap();
        assert_eq!(index.node(second).unwrap().parent(), Some(album));
        assert_eq!(index.node(album).unwrap().children().len(), 2);
        let artist = index.node(album).unwrap().parent().unwrap();
        assert_eq!(index.node(artist).unwrap().children().len(), 1);
    }

    #[test]
    fn test_same_album_name_under_different_artists_stays_separate() {
        let mut index = LibraryIndex::new();
        let a = index.insert_from_record(&record("/m/1.mp3", "Alpha", "Hits", "One", 1990));
        let b = index.insert_from_record(&record("/m/2.mp3", "Anvil", "Hits", "Two", 1991));
        assert_ne!(
            index.node(a).unwrap().parent(),
            index.node(b).unwrap().parent()
        );
        assert_eq!(index.children(None).len(), 1);
    }

    #[test]
    fn test_album_artist_groups_compilation() {
        let mut index = LibraryIndex::new();
        let mut first = record("/m/c/1.mp3", "Blondie", "Hits", "Call Me", 1980);
        first.album_artist = "Various".to_string();
        let mut second = record("/m/c/2.mp3", "Cher", "Hits", "Believe", 1998);
        second.album_artist = "Various".to_string();
        let a = index.insert_from_record(&first);
        let b = index.insert_from_record(&second);
        assert_eq!(index.node(a).unwrap().parent(), index.node(b).unwrap().parent());
        let letter = index.children(None)[0];
        assert_eq!(display(&index, letter), "V");
    }

    #[test]
    fn test_sort_orders_case_insensitively() {
        let mut index = LibraryIndex::new();
        index.insert_from_record(&record("/m/1.mp3", "beck", "Odelay", "Devils Haircut", 1996));
        index.insert_from_record(&record("/m/2.mp3", "Bjork", "Post", "Army of Me", 1995));
        index.insert_from_record(&record("/m/3.mp3", "Air", "Moon Safari", "La femme", 1998));
        index.insert_from_record(&record("/m/4.mp3", "Air", "Moon Safari", "Kelly", 1998));
        index.sort();

        let letters: Vec<String> = index
            .children(None)
            .iter()
            .map(|id| display(&index, *id))
            .collect();
        assert_eq!(letters, vec!["A", "B"]);
        let b_artists: Vec<String> = index
            .children(Some(index.children(None)[1]))
            .iter()
            .map(|id| display(&index, *id))
            .collect();
        assert_eq!(b_artists, vec!["beck", "Bjork"]);
        let moon_safari = index.node_at(&[0, 0, 0]).unwrap();
        let tracks: Vec<String> = index
            .children(Some(moon_safari))
            .iter()
            .map(|id| display(&index, *id))
            .collect();
        assert_eq!(tracks, vec!["Kelly", "La femme"]);
    }

    #[test]
    fn test_node_at_and_address_of_are_inverse() {
        let mut index = LibraryIndex::new();
        index.insert_from_record(&record("/m/1.mp3", "Abba", "Arrival", "One", 1976));
        let track =
            index.insert_from_record(&record("/m/2.mp3", "Blur", "Parklife", "Two", 1994));
        let address = index.address_of(track).unwrap();
        assert_eq!(address, vec![1, 0, 0, 0]);
        assert_eq!(index.node_at(&address), Some(track));
        assert_eq!(index.node_at(&[5]), None);
    }

    #[test]
    fn test_find_by_path() {
        let mut index = LibraryIndex::new();
        let track =
            index.insert_from_record(&record("/m/1.mp3", "Abba", "Arrival", "One", 1976));
        assert_eq!(index.find_by_path(Path::new("/m/1.mp3")), Some(track));
        assert_eq!(index.find_by_path(Path::new("/m/missing.mp3")), None);
    }

    #[test]
    fn test_remove_track_drops_empty_ancestors() {
        let mut index = LibraryIndex::new();
        index.insert_from_record(&record("/m/1.mp3", "Abba", "Arrival", "One", 1976));
        index.insert_from_record(&record("/m/2.mp3", "Blur", "Parklife", "Two", 1994));

        assert_eq!(index.remove_track(Path::new("/m/1.mp3")), 1);
        assert_eq!(index.children(None).len(), 1);
        assert_eq!(display(&index, index.children(None)[0]), "B");

        // A re-insert recreates the chain instead of reusing detached nodes.
        let track =
            index.insert_from_record(&record("/m/1.mp3", "Abba", "Arrival", "One", 1976));
        assert_eq!(index.ancestors(track).len(), 3);
        assert_eq!(index.children(None).len(), 2);
    }

    #[test]
    fn test_prune_missing_removes_only_vanished_files() {
        let dir = tempdir().unwrap();
        let kept = dir.path().join("kept.mp3");
        File::create(&kept).unwrap();
        let gone = dir.path().join("gone.mp3");

        let mut index = LibraryIndex::new();
        index.insert_from_record(&record(kept.to_str().unwrap(), "Abba", "Arrival", "Kept", 1976));
        index.insert_from_record(&record(gone.to_str().unwrap(), "Cure", "Seventeen", "Gone", 1980));

        assert_eq!(index.prune_missing(), 1);
        assert_eq!(index.track_count(), 1);
        assert!(index.find_by_path(&kept).is_some());
        assert_eq!(index.children(None).len(), 1);
    }

    #[test]
    fn test_cover_assignment_before_and_after_tracks() {
        let mut index = LibraryIndex::new();
        index.assign_cover(Path::new("/m/abba/arrival/scan.jpg"));
        let song = record("/m/abba/arrival/1.mp3", "Abba", "Arrival", "One", 1976);
        let track = index.insert_from_record(&song);
        let album = index.node(track).unwrap().parent().unwrap();
        assert_eq!(
            index.node(album).unwrap().as_album().unwrap().cover_path.as_deref(),
            Some(Path::new("/m/abba/arrival/scan.jpg"))
        );

        index.assign_cover(Path::new("/m/abba/arrival/Folder.png"));
        assert_eq!(
            index.node(album).unwrap().as_album().unwrap().cover_path.as_deref(),
            Some(Path::new("/m/abba/arrival/Folder.png"))
        );

        // A non-preferred name never displaces a preferred one.
        index.assign_cover(Path::new("/m/abba/arrival/back.jpg"));
        assert_eq!(
            index.node(album).unwrap().as_album().unwrap().cover_path.as_deref(),
            Some(Path::new("/m/abba/arrival/Folder.png"))
        );
    }

    #[test]
    fn test_save_clear_load_round_trip() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("library.cache");

        let mut index = LibraryIndex::new();
        let mut compilation = record("/m/v/1.mp3", "Blondie", "Hits", "Call Me", 1980);
        compilation.album_artist = "Various".to_string();
        index.insert_from_record(&compilation);
        index.insert_from_record(&record("/m/a/1.mp3", "Abba", "Hits", "Waterloo", 1974));
        index.insert_from_record(&record("/m/a/2.mp3", "Abba", "Hits", "SOS", 1975));
        index.assign_cover(Path::new("/m/a/cover.jpg"));
        index.sort();
        let before = shape(&index);

        index.save_to_file(&cache, &["/m".to_string()]).unwrap();
        index.clear();
        assert!(index.is_empty());

        let header = index.load_from_file(&cache).unwrap();
        assert_eq!(header.roots, vec!["/m".to_string()]);
        assert_eq!(shape(&index), before);
        let waterloo = index.find_by_path(Path::new("/m/a/1.mp3")).unwrap();
        let album = index.node(waterloo).unwrap().parent().unwrap();
        assert_eq!(
            index.node(album).unwrap().as_album().unwrap().cover_path.as_deref(),
            Some(Path::new("/m/a/cover.jpg"))
        );
    }

    #[test]
    fn test_round_trip_keeps_year_of_track_that_created_album() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("library.cache");

        let mut index = LibraryIndex::new();
        index.insert_from_record(&record("/m/g/2.mp3", "Abba", "Gold", "Zzz", 1992));
        index.insert_from_record(&record("/m/g/1.mp3", "Abba", "Gold", "Aaa", 1976));
        index.sort();
        index.save_to_file(&cache, &[]).unwrap();
        index.clear();
        index.load_from_file(&cache).unwrap();

        let track = index.find_by_path(Path::new("/m/g/1.mp3")).unwrap();
        let album = index.node(track).unwrap().parent().unwrap();
        assert_eq!(index.node(album).unwrap().as_album().unwrap().year, 1992);
        assert_eq!(index.node(track).unwrap().as_track().unwrap().year, 1976);
    }

    fn arb_records() -> impl Strategy<Value = Vec<TrackRecord>> {
        let field = (
            prop::sample::select(vec!["Abba", "abba", "Blur", "9 Lives", "Cher"]),
            prop::sample::select(vec!["", "Various", "Abba"]),
            prop::sample::select(vec!["Gold", "Hits", "Parklife"]),
            "[a-zA-Z ]{1,8}",
            1..3i32,
            1970..2000i32,
        );
        prop::collection::vec(field, 0..24).prop_map(|fields| {
            fields
                .into_iter()
                .enumerate()
                .map(|(n, (artist, album_artist, album, title, disc, year))| TrackRecord {
                    absolute_path: PathBuf::from(format!("/m/{n}.mp3")),
                    artist: artist.to_string(),
                    album_artist: album_artist.to_string(),
                    album: album.to_string(),
                    title,
                    disc_number: disc,
                    year,
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_save_clear_load_restores_tree(records in arb_records()) {
            let dir = tempdir().unwrap();
            let cache = dir.path().join("library.cache");
            let mut index = LibraryIndex::new();
            for record in &records {
                index.insert_from_record(record);
            }
            index.sort();
            let before = shape(&index);
            let albums_before = album_fields(&index);

            index.save_to_file(&cache, &["/m".to_string()]).unwrap();
            index.clear();
            index.load_from_file(&cache).unwrap();

            prop_assert_eq!(index.track_count(), records.len());
            prop_assert_eq!(shape(&index), before);
            prop_assert_eq!(album_fields(&index), albums_before);
        }
    }
}
