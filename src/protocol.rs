//! Messages exchanged between the scan worker, the library controller and
//! whatever presents the tree.

use std::path::PathBuf;

use crate::library::node::{NodeId, TrackRecord};

/// Totals reported when a scan finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files turned into a `Discovered` message.
    pub discovered: usize,
    /// Files whose metadata could not be read.
    pub skipped: usize,
    pub covers: usize,
}

/// Worker-to-controller traffic. Only the controller consumes these.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanMessage {
    Discovered(TrackRecord),
    CoverDiscovered(PathBuf),
    /// Percentage of files processed, 0 to 100.
    Progress(u8),
    Completed(ScanStats),
    Failed(String),
    Cancelled,
}

/// Controller notifications broadcast to any number of subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    Progress(u8),
    /// A full scan finished and the tree is sorted.
    SearchHasEnded,
    /// The tree was restored from the cache file.
    LoadedFromFile,
    /// A targeted refresh finished.
    RebuildEnded,
    ScanFailed(String),
    AppendToPlaylist(Vec<PathBuf>),
    OpenTagEditor(Vec<PathBuf>),
}

/// Entries of the per-node context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    SendToCurrentPlaylist,
    Properties,
}

/// Inputs coming from the tree view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    FilterTextChanged(String),
    NodeExpanded(NodeId),
    NodeCollapsed(NodeId),
    DoubleClicked(NodeId),
    ContextActionTriggered {
        action: ContextAction,
        selection: Vec<NodeId>,
    },
}
