//! Library population and tree interaction.
//!
//! The controller is the only mutator of the [`LibraryIndex`]. It decides
//! between a cache load and a scan, drains the scan worker's messages on its
//! own thread, keeps the filtered view, album shelf and covers in step with
//! the index, and publishes [`LibraryEvent`]s on a broadcast bus.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::broadcast;

use super::album_shelf::AlbumShelf;
use super::cache_file;
use super::covers::CoverCache;
use super::filter::{FilterChange, FilterView};
use super::index::LibraryIndex;
use super::node::{NodeId, NodeKind};
use super::scan_worker::ScanWorker;
use crate::config::{sanitize_config, Config};
use crate::config_persistence::persist_config_file;
use crate::error::{CacheResult, ScanError};
use crate::metadata_tags::MetadataReader;
use crate::protocol::{ContextAction, LibraryEvent, ScanMessage, UiEvent};

const EVENT_BUS_CAPACITY: usize = 1024;

/// Where `begin_populate_tree` takes the tree from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateSource {
    Scan,
    Cache,
}

#[derive(Debug)]
enum PendingWork {
    Idle,
    FullScan,
    /// Paths whose old leaves are replaced when their new record arrives.
    Rebuild { pending: HashSet<PathBuf> },
}

pub struct LibraryController {
    config: Config,
    config_path: Option<PathBuf>,
    cache_path: PathBuf,
    index: LibraryIndex,
    filter: FilterView,
    covers: CoverCache,
    shelf: AlbumShelf,
    worker: ScanWorker,
    scan_receiver: Option<Receiver<ScanMessage>>,
    work: PendingWork,
    expanded: HashSet<NodeId>,
    progress: u8,
    bus: broadcast::Sender<LibraryEvent>,
}

impl LibraryController {
    /// `config_path`, when given, receives cover size changes.
    pub fn new(
        config: Config,
        reader: Arc<dyn MetadataReader>,
        cache_path: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Self {
        let config = sanitize_config(config);
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            covers: CoverCache::new(&config.covers),
            worker: ScanWorker::new(reader, config.scan.progress_updates_per_second),
            config,
            config_path,
            cache_path,
            index: LibraryIndex::new(),
            filter: FilterView::new(),
            shelf: AlbumShelf::new(),
            scan_receiver: None,
            work: PendingWork::Idle,
            expanded: HashSet::new(),
            progress: 0,
            bus,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.bus.subscribe()
    }

    fn publish(&self, event: LibraryEvent) {
        // Nobody listening is fine.
        let _ = self.bus.send(event);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &LibraryIndex {
        &self.index
    }

    pub fn filter(&self) -> &FilterView {
        &self.filter
    }

    pub fn shelf(&self) -> &AlbumShelf {
        &self.shelf
    }

    pub fn covers(&self) -> &CoverCache {
        &self.covers
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// True while a scan or rebuild still has messages to deliver.
    pub fn is_busy(&self) -> bool {
        self.scan_receiver.is_some()
    }

    /// Whether the configured folders differ from the ones the cache was built from.
    /// A missing or unreadable cache counts as changed.
    pub fn music_location_changed(&self) -> bool {
        match cache_file::read_header(&self.cache_path) {
            Ok(header) => header.roots != self.config.library.folders,
            Err(err) => {
                debug!("No usable cache header ({}), treating location as changed", err);
                true
            }
        }
    }

    /// Clears the tree and refills it from a scan when `location_changed` is
    /// set or no cache exists, from the cache file otherwise. A corrupt cache
    /// falls back to a scan.
    ///
    /// A running scan is cancelled when the location changed again, and
    /// reported as `AlreadyScanning` otherwise.
    pub fn begin_populate_tree(
        &mut self,
        location_changed: bool,
    ) -> Result<PopulateSource, ScanError> {
        if self.worker.is_scanning() {
            if !location_changed {
                return Err(ScanError::AlreadyScanning);
            }
            self.cancel_scan();
        }

        if !location_changed && self.cache_path.exists() {
            match self.load_from_cache() {
                Ok(()) => return Ok(PopulateSource::Cache),
                Err(err) => warn!(
                    "Library cache {} unusable ({}), falling back to a full scan",
                    self.cache_path.display(),
                    err
                ),
            }
        }

        self.start_full_scan()?;
        Ok(PopulateSource::Scan)
    }

    fn reset_tree(&mut self) {
        self.index.clear();
        self.shelf.reset();
        self.expanded.clear();
        self.filter.invalidate(&self.index);
    }

    fn load_from_cache(&mut self) -> CacheResult<()> {
        self.reset_tree();
        self.index.load_from_file(&self.cache_path)?;
        self.shelf.rebuild_from(&self.index);
        self.end_populate_tree(LibraryEvent::LoadedFromFile);
        Ok(())
    }

    fn start_full_scan(&mut self) -> Result<(), ScanError> {
        let receiver = self.worker.start(self.config.library.folder_paths())?;
        info!(
            "Scanning music folders: {}",
            self.config.library.folders.join(", ")
        );
        self.reset_tree();
        self.progress = 0;
        self.scan_receiver = Some(receiver);
        self.work = PendingWork::FullScan;
        Ok(())
    }

    /// Sorts, refreshes the view and hides progress.
    fn end_populate_tree(&mut self, event: LibraryEvent) {
        self.index.sort();
        self.refresh_view();
        self.progress = 0;
        self.publish(LibraryEvent::Progress(0));
        self.publish(event);
    }

    fn refresh_view(&mut self) {
        self.expanded.retain(|id| self.index.node(*id).is_some());
        self.filter.invalidate(&self.index);
    }

    fn save_cache(&self) {
        if let Err(err) = self
            .index
            .save_to_file(&self.cache_path, &self.config.library.folders)
        {
            warn!(
                "Failed to save library cache {}: {}",
                self.cache_path.display(),
                err
            );
        }
    }

    /// Stops the running scan or rebuild, keeping whatever arrived so far.
    pub fn cancel_scan(&mut self) {
        self.worker.cancel();
        self.drain_pending();
        self.scan_receiver = None;
        self.work = PendingWork::Idle;
        self.progress = 0;
    }

    fn drain_pending(&mut self) {
        let mut inserted = false;
        while let Some(Ok(message)) = self.scan_receiver.as_ref().map(Receiver::try_recv) {
            inserted |= self.handle_scan_message(message);
        }
        if inserted {
            self.index.sort();
            self.refresh_view();
        }
    }

    /// Handles everything the worker sent so far without blocking.
    /// Returns true while more is expected.
    pub fn poll(&mut self) -> bool {
        let mut inserted = false;
        loop {
            let next = match self.scan_receiver.as_ref() {
                Some(receiver) => receiver.try_recv(),
                None => break,
            };
            match next {
                Ok(message) => inserted |= self.handle_scan_message(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.abandon_work();
                    break;
                }
            }
        }
        if inserted && self.is_busy() {
            self.filter.invalidate(&self.index);
        }
        self.is_busy()
    }

    /// Blocks until the current scan or rebuild has ended or `timeout`
    /// elapsed. Returns true when nothing is pending any more.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let next = match self.scan_receiver.as_ref() {
                Some(receiver) => receiver.recv_timeout(remaining),
                None => break,
            };
            match next {
                Ok(message) => {
                    self.handle_scan_message(message);
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => self.abandon_work(),
            }
        }
        true
    }

    fn abandon_work(&mut self) {
        warn!("Library scan ended without reporting a result");
        self.scan_receiver = None;
        self.work = PendingWork::Idle;
        self.index.sort();
        self.refresh_view();
        self.progress = 0;
        self.publish(LibraryEvent::Progress(0));
    }

    /// Returns true when a track was inserted.
    fn handle_scan_message(&mut self, message: ScanMessage) -> bool {
        match message {
            ScanMessage::Discovered(record) => {
                if let PendingWork::Rebuild { pending } = &mut self.work {
                    if pending.remove(&record.absolute_path) {
                        self.index.remove_track(&record.absolute_path);
                    }
                } else {
                    self.shelf.insert_track(&record);
                }
                self.index.insert_from_record(&record);
                return true;
            }
            ScanMessage::CoverDiscovered(path) => self.index.assign_cover(&path),
            ScanMessage::Progress(progress) => {
                self.progress = progress;
                self.publish(LibraryEvent::Progress(progress));
            }
            ScanMessage::Completed(stats) => {
                self.scan_receiver = None;
                match std::mem::replace(&mut self.work, PendingWork::Idle) {
                    PendingWork::Rebuild { pending } => {
                        if !pending.is_empty() {
                            debug!("{} track(s) kept their previous metadata", pending.len());
                        }
                        self.index.sort();
                        self.shelf.rebuild_from(&self.index);
                        self.save_cache();
                        self.end_populate_tree(LibraryEvent::RebuildEnded);
                    }
                    PendingWork::FullScan | PendingWork::Idle => {
                        info!(
                            "Library populated with {} track(s) ({} unreadable)",
                            stats.discovered, stats.skipped
                        );
                        self.index.sort();
                        self.save_cache();
                        self.end_populate_tree(LibraryEvent::SearchHasEnded);
                    }
                }
            }
            ScanMessage::Failed(reason) => {
                self.scan_receiver = None;
                let work = std::mem::replace(&mut self.work, PendingWork::Idle);
                self.publish(LibraryEvent::ScanFailed(reason));
                self.progress = 0;
                self.publish(LibraryEvent::Progress(0));
                if matches!(work, PendingWork::FullScan) && self.cache_path.exists() {
                    warn!("Scan failed, restoring the library from its cache");
                    if let Err(err) = self.load_from_cache() {
                        warn!("Library cache could not be loaded either: {}", err);
                    }
                }
            }
            ScanMessage::Cancelled => {
                self.scan_receiver = None;
                self.work = PendingWork::Idle;
                self.progress = 0;
                self.publish(LibraryEvent::Progress(0));
            }
        }
        false
    }

    /// Re-reads the metadata of every track below `nodes`, then sorts and
    /// saves. Returns how many files are being re-read.
    ///
    /// Tracks whose file can no longer be read keep their current leaf; use
    /// [`LibraryController::prune_missing`] to drop vanished files.
    pub fn rebuild(&mut self, nodes: &[NodeId]) -> Result<usize, ScanError> {
        if self.worker.is_scanning() {
            return Err(ScanError::AlreadyScanning);
        }
        let mut tracks = BTreeMap::new();
        for node in nodes {
            self.collect_tracks(*node, false, &mut tracks);
        }
        if tracks.is_empty() {
            return Ok(0);
        }
        let files: Vec<PathBuf> = tracks.into_keys().collect();
        let count = files.len();
        let receiver = self.worker.start_with_files(files.clone())?;
        info!("Refreshing metadata of {} track(s)", count);
        self.scan_receiver = Some(receiver);
        self.work = PendingWork::Rebuild {
            pending: files.into_iter().collect(),
        };
        Ok(count)
    }

    /// Removes tracks whose file is gone and saves the cache if anything changed.
    pub fn prune_missing(&mut self) -> usize {
        let removed = self.index.prune_missing();
        if removed > 0 {
            self.shelf.rebuild_from(&self.index);
            self.refresh_view();
            self.save_cache();
        }
        removed
    }

    /// Applies the live text filter. A narrowing pattern also re-sorts and
    /// collapses the tree.
    pub fn set_filter(&mut self, pattern: &str) -> FilterChange {
        let change = self.filter.set_filter(pattern, &self.index);
        if change.resort_and_collapse {
            self.index.sort();
            self.filter.invalidate(&self.index);
            self.collapse_all();
        }
        change
    }

    /// Records the expansion and loads covers of the albums it reveals.
    pub fn node_expanded(&mut self, id: NodeId) {
        if self.index.node(id).is_none() {
            return;
        }
        self.expanded.insert(id);
        let albums = self.index.albums_under(id);
        self.covers.resolve_covers(&mut self.index, &albums);
    }

    pub fn node_collapsed(&mut self, id: NodeId) {
        self.expanded.remove(&id);
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    /// Expands `id` (unless it is a track) and every ancestor, outermost first.
    pub fn expand_to(&mut self, id: NodeId) {
        let Some(node) = self.index.node(id) else {
            return;
        };
        let expand_self = !node.children().is_empty();
        let mut chain = self.index.ancestors(id);
        chain.reverse();
        if expand_self {
            chain.push(id);
        }
        for node in chain {
            self.node_expanded(node);
        }
    }

    /// Changes the cover display size. When the buffer resolution moves,
    /// covers of expanded nodes are decoded again. The new sizes are
    /// persisted when a config path is known.
    pub fn set_cover_size(&mut self, new_size: u32) -> bool {
        let reloaded = self.covers.set_cover_size(&mut self.index, new_size);
        if reloaded {
            let expanded: Vec<NodeId> = self.expanded.iter().copied().collect();
            for id in expanded {
                let albums = self.index.albums_under(id);
                self.covers.resolve_covers(&mut self.index, &albums);
            }
        }
        self.config.covers.cover_size = self.covers.cover_size();
        self.config.covers.buffered_cover_size = self.covers.buffered_cover_size();
        if let Some(config_path) = &self.config_path {
            persist_config_file(&self.config, config_path);
        }
        reloaded
    }

    /// Track leaves below `id`. Without `visible_only` the filter is ignored.
    fn collect_tracks(&self, id: NodeId, visible_only: bool, out: &mut BTreeMap<PathBuf, NodeId>) {
        let Some(node) = self.index.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Track(track) => {
                out.insert(track.absolute_path.clone(), id);
            }
            NodeKind::Letter { .. } | NodeKind::Artist { .. } | NodeKind::Album(_) => {
                let children = if visible_only {
                    self.filter.children(Some(id))
                } else {
                    node.children()
                };
                for child in children {
                    self.collect_tracks(*child, visible_only, out);
                }
            }
        }
    }

    fn visible_leaf_count(&self, id: NodeId) -> usize {
        match self.index.node(id).map(|node| &node.kind) {
            Some(NodeKind::Track(_)) => 1,
            Some(_) => self
                .filter
                .children(Some(id))
                .iter()
                .map(|child| self.visible_leaf_count(*child))
                .sum(),
            None => 0,
        }
    }

    /// Visible tracks below `id`. A node without any counts as one.
    pub fn count(&self, id: NodeId) -> usize {
        match self.visible_leaf_count(id) {
            0 => 1,
            leaves => leaves,
        }
    }

    pub fn count_all(&self, nodes: &[NodeId]) -> usize {
        nodes.iter().map(|id| self.count(*id)).sum()
    }

    /// Adds every visible track below `id` to `tracks`, keyed by path.
    pub fn find_all(&self, id: NodeId, tracks: &mut BTreeMap<PathBuf, NodeId>) {
        self.collect_tracks(id, true, tracks);
    }

    fn selection_paths(&self, selection: &[NodeId]) -> Vec<PathBuf> {
        let mut tracks = BTreeMap::new();
        for id in selection {
            self.find_all(*id, &mut tracks);
        }
        tracks.into_keys().collect()
    }

    /// Menu entries for `id`. Letters have no menu.
    pub fn context_actions(&self, id: NodeId) -> Vec<ContextAction> {
        match self.index.node(id) {
            Some(node) if !node.is_letter() => {
                vec![ContextAction::SendToCurrentPlaylist, ContextAction::Properties]
            }
            _ => Vec::new(),
        }
    }

    pub fn handle_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::FilterTextChanged(pattern) => {
                self.set_filter(&pattern);
            }
            UiEvent::NodeExpanded(id) => self.node_expanded(id),
            UiEvent::NodeCollapsed(id) => self.node_collapsed(id),
            UiEvent::DoubleClicked(id) => {
                self.publish_selection(&[id], ContextAction::SendToCurrentPlaylist)
            }
            UiEvent::ContextActionTriggered { action, selection } => {
                self.publish_selection(&selection, action)
            }
        }
    }

    fn publish_selection(&self, selection: &[NodeId], action: ContextAction) {
        let paths = self.selection_paths(selection);
        if paths.is_empty() {
            return;
        }
        match action {
            ContextAction::SendToCurrentPlaylist => {
                self.publish(LibraryEvent::AppendToPlaylist(paths))
            }
            ContextAction::Properties => self.publish(LibraryEvent::OpenTagEditor(paths)),
        }
    }
}
