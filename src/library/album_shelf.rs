//! Flat album presentation of the library, one card per album name.

use std::collections::HashMap;

use super::index::LibraryIndex;
use super::node::TrackRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumCard {
    pub artist: String,
    pub album: String,
    pub year: i32,
    pub disc_number: i32,
    pub track_titles: Vec<String>,
}

/// Cards keep first-insertion order. Two artists sharing an album name share
/// a card; the first artist seen names it.
#[derive(Debug, Default)]
pub struct AlbumShelf {
    cards: Vec<AlbumCard>,
    by_album: HashMap<String, usize>,
}

impl AlbumShelf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.cards.clear();
        self.by_album.clear();
    }

    pub fn insert_track(&mut self, record: &TrackRecord) {
        if let Some(slot) = self.by_album.get(&record.album) {
            if let Some(card) = self.cards.get_mut(*slot) {
                card.track_titles.push(record.title.clone());
                return;
            }
        }
        self.by_album.insert(record.album.clone(), self.cards.len());
        self.cards.push(AlbumCard {
            artist: record.effective_artist().to_string(),
            album: record.album.clone(),
            year: record.year,
            disc_number: record.disc_number,
            track_titles: vec![record.title.clone()],
        });
    }

    /// Replaces every card with what the index holds, in tree order.
    pub fn rebuild_from(&mut self, index: &LibraryIndex) {
        self.reset();
        for entry in index.track_entries() {
            self.insert_track(&entry.to_record());
        }
    }

    pub fn cards(&self) -> &[AlbumCard] {
        &self.cards
    }

    pub fn card(&self, album: &str) -> Option<&AlbumCard> {
        self.by_album.get(album).and_then(|slot| self.cards.get(*slot))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::record;

    #[test]
    fn test_insert_track_groups_by_album_name() {
        let mut shelf = AlbumShelf::new();
        shelf.insert_track(&record("/m/1.mp3", "A", "X", "1", 2000));
        shelf.insert_track(&record("/m/2.mp3", "A", "X", "2", 2000));
        shelf.insert_track(&record("/m/3.mp3", "B", "Y", "3", 2001));

        assert_eq!(shelf.len(), 2);
        let x = shelf.card("X").unwrap();
        assert_eq!(x.artist, "A");
        assert_eq!(x.year, 2000);
        assert_eq!(x.track_titles, vec!["1", "2"]);
    }

    #[test]
    fn test_album_name_collision_shares_first_card() {
        let mut shelf = AlbumShelf::new();
        shelf.insert_track(&record("/m/1.mp3", "Alpha", "Greatest Hits", "One", 1990));
        shelf.insert_track(&record("/m/2.mp3", "Beta", "Greatest Hits", "Two", 1995));
        assert_eq!(shelf.len(), 1);
        assert_eq!(shelf.cards()[0].artist, "Alpha");
        assert_eq!(shelf.cards()[0].track_titles.len(), 2);
    }

    #[test]
    fn test_rebuild_from_index_and_reset() {
        let mut index = LibraryIndex::new();
        index.insert_from_record(&record("/m/2.mp3", "B", "Y", "3", 2001));
        index.insert_from_record(&record("/m/1.mp3", "A", "X", "1", 2000));
        index.sort();

        let mut shelf = AlbumShelf::new();
        shelf.insert_track(&record("/m/9.mp3", "Z", "Stale", "9", 1999));
        shelf.rebuild_from(&index);
        let albums: Vec<&str> = shelf.cards().iter().map(|card| card.album.as_str()).collect();
        assert_eq!(albums, vec!["X", "Y"]);

        shelf.reset();
        assert!(shelf.is_empty());
        assert!(shelf.card("X").is_none());
    }
}
