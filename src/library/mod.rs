//! Music library tree: the index, its filtered view, lazy cover loading, the
//! background scan and the controller tying them together.

pub mod album_shelf;
pub mod cache_file;
pub mod controller;
pub mod covers;
pub mod filter;
pub mod index;
pub mod node;
pub mod scan_worker;

pub use album_shelf::{AlbumCard, AlbumShelf};
pub use controller::{LibraryController, PopulateSource};
pub use covers::CoverCache;
pub use filter::{FilterChange, FilterView};
pub use index::{LibraryIndex, TrackEntry};
pub use node::{AlbumNode, CoverImage, Node, NodeId, NodeKind, TrackNode, TrackRecord};
pub use scan_worker::{ScanState, ScanWorker};
