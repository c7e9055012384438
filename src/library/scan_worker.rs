//! Background library scan.
//!
//! The worker never touches the tree. It walks the music folders on its own
//! thread, turns each playable file into a [`TrackRecord`] through the
//! metadata reader and sends one [`ScanMessage`] per file to the controller.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use governor::{Quota, RateLimiter};
use log::{debug, info, warn};

use crate::error::ScanError;
use crate::media_file_discovery::{collect_library_files, LibraryFiles};
use crate::metadata_tags::MetadataReader;
use crate::protocol::{ScanMessage, ScanStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Completed,
    Failed,
}

impl ScanState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ScanState::Scanning,
            2 => ScanState::Completed,
            3 => ScanState::Failed,
            _ => ScanState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ScanState::Idle => 0,
            ScanState::Scanning => 1,
            ScanState::Completed => 2,
            ScanState::Failed => 3,
        }
    }
}

enum ScanJob {
    Folders(Vec<PathBuf>),
    Files(Vec<PathBuf>),
}

/// Owns at most one running scan thread.
pub struct ScanWorker {
    reader: Arc<dyn MetadataReader>,
    progress_updates_per_second: u32,
    state: Arc<AtomicU8>,
    cancel_requested: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScanWorker {
    pub fn new(reader: Arc<dyn MetadataReader>, progress_updates_per_second: u32) -> Self {
        Self {
            reader,
            progress_updates_per_second,
            state: Arc::new(AtomicU8::new(ScanState::Idle.as_u8())),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Scanning
    }

    /// Walks every folder in `roots`. A folder that is missing when the
    /// thread reaches it fails the scan.
    pub fn start(&mut self, roots: Vec<PathBuf>) -> Result<Receiver<ScanMessage>, ScanError> {
        self.spawn(ScanJob::Folders(roots))
    }

    /// Reads exactly `files` instead of walking folders.
    pub fn start_with_files(
        &mut self,
        files: Vec<PathBuf>,
    ) -> Result<Receiver<ScanMessage>, ScanError> {
        self.spawn(ScanJob::Files(files))
    }

    fn spawn(&mut self, job: ScanJob) -> Result<Receiver<ScanMessage>, ScanError> {
        if self.is_scanning() {
            return Err(ScanError::AlreadyScanning);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        self.state
            .store(ScanState::Scanning.as_u8(), Ordering::Release);
        self.cancel_requested.store(false, Ordering::Release);

        let (sender, receiver) = mpsc::channel();
        let run = ScanRun {
            reader: Arc::clone(&self.reader),
            sender,
            state: Arc::clone(&self.state),
            cancel_requested: Arc::clone(&self.cancel_requested),
            progress_updates_per_second: self.progress_updates_per_second,
        };
        let spawned = thread::Builder::new()
            .name("library-scan".to_string())
            .spawn(move || run.execute(job));
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(receiver)
            }
            Err(err) => {
                warn!("Failed to spawn library scan thread: {}", err);
                self.state.store(ScanState::Failed.as_u8(), Ordering::Release);
                let (failed_sender, failed_receiver) = mpsc::channel();
                let _ = failed_sender.send(ScanMessage::Failed(err.to_string()));
                Ok(failed_receiver)
            }
        }
    }

    /// Stops a running scan at the next directory entry, cover or file and
    /// waits for the thread.
    /// The worker is `Idle` afterwards unless the scan had already ended.
    pub fn cancel(&mut self) {
        self.cancel_requested.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct ScanRun {
    reader: Arc<dyn MetadataReader>,
    sender: Sender<ScanMessage>,
    state: Arc<AtomicU8>,
    cancel_requested: Arc<AtomicBool>,
    progress_updates_per_second: u32,
}

impl ScanRun {
    fn finish(&self, state: ScanState, message: ScanMessage) {
        self.state.store(state.as_u8(), Ordering::Release);
        let _ = self.sender.send(message);
    }

    /// Returns false once nobody listens any more.
    fn send(&self, message: ScanMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    fn cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    fn stop_cancelled(&self, handled: usize) {
        info!("Library scan cancelled after {} file(s)", handled);
        self.finish(ScanState::Idle, ScanMessage::Cancelled);
    }

    /// `Ok(None)` means the walk was cancelled.
    fn collect(&self, job: ScanJob) -> Result<Option<LibraryFiles>, ScanError> {
        match job {
            ScanJob::Files(tracks) => Ok(Some(LibraryFiles {
                tracks,
                covers: Vec::new(),
            })),
            ScanJob::Folders(roots) => {
                let mut files = LibraryFiles::default();
                for root in roots {
                    if !root.is_dir() {
                        return Err(ScanError::RootUnavailable(root));
                    }
                    let Some(found) = collect_library_files(&root, || self.cancelled()) else {
                        return Ok(None);
                    };
                    files.tracks.extend(found.tracks);
                    files.covers.extend(found.covers);
                }
                Ok(Some(files))
            }
        }
    }

    fn execute(self, job: ScanJob) {
        let files = match self.collect(job) {
            Ok(Some(files)) => files,
            Ok(None) => {
                self.stop_cancelled(0);
                return;
            }
            Err(err) => {
                warn!("Library scan failed: {}", err);
                self.finish(ScanState::Failed, ScanMessage::Failed(err.to_string()));
                return;
            }
        };

        let rate = NonZeroU32::new(self.progress_updates_per_second).unwrap_or(NonZeroU32::MIN);
        let progress_limiter = RateLimiter::direct(Quota::per_second(rate));
        let mut stats = ScanStats::default();

        for cover in files.covers {
            if self.cancelled() {
                self.stop_cancelled(0);
                return;
            }
            stats.covers += 1;
            if !self.send(ScanMessage::CoverDiscovered(cover)) {
                self.state.store(ScanState::Idle.as_u8(), Ordering::Release);
                return;
            }
        }

        let total = files.tracks.len();
        let mut last_progress = None;
        for (position, path) in files.tracks.iter().enumerate() {
            if self.cancelled() {
                self.stop_cancelled(position);
                return;
            }

            match self.reader.read_track(path) {
                Ok(record) => {
                    stats.discovered += 1;
                    if !self.send(ScanMessage::Discovered(record)) {
                        self.state.store(ScanState::Idle.as_u8(), Ordering::Release);
                        return;
                    }
                }
                Err(err) => {
                    stats.skipped += 1;
                    debug!("Library scan: skipping {}", err);
                }
            }

            let progress = ((position + 1) * 100 / total) as u8;
            let changed = last_progress != Some(progress);
            if changed && (progress == 100 || progress_limiter.check().is_ok()) {
                last_progress = Some(progress);
                let _ = self.send(ScanMessage::Progress(progress));
            }
        }
        if last_progress != Some(100) {
            let _ = self.send(ScanMessage::Progress(100));
        }

        info!(
            "Library scan finished: {} track(s), {} skipped, {} cover(s)",
            stats.discovered, stats.skipped, stats.covers
        );
        self.finish(ScanState::Completed, ScanMessage::Completed(stats));
    }
}
