//! Static-file sync: copy in-place edits in the output tree back to source.
//!
//! While iterating on stylesheets or images it is convenient to edit the
//! built copy directly and have the change land in the source tree. The
//! watcher does exactly that, and nothing more:
//!
//! ```text
//! notify thread ──Result<Event>──▶ consumer thread ──SyncReport──▶ printer
//!                                   (owns DebounceRecord)
//! foreground: sleep(delay) until Ctrl-C or consumer exit
//! ```
//!
//! ## Admission
//!
//! Each normalized [`FsEvent`] passes these checks in order:
//!
//! 1. Not a content modification → ignored silently
//! 2. Same event seen within the delay → debounced
//! 3. Carries a destination (move/rename) → rejected
//! 4. Outside the watched root → rejected
//! 5. Generated by the build (`*.html`, web manifest, sitemap) → rejected
//! 6. No existing regular file at the paired source path → rejected
//! 7. Otherwise copy bytes and mtime onto the pair
//!
//! A debounced event is kept as pending. Once the delay has passed without
//! another sighting it is re-checked and copied if the pair differs, so the
//! last write of a burst always lands.
//!
//! Files are never created in the source tree, only overwritten.

use crate::finalize::{MANIFEST_PATH, SITEMAP_FILE};
use crate::walk::{copy_preserving, is_page};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Record size above which stale identities are swept.
pub const SWEEP_THRESHOLD: usize = 256;
/// Identities older than this many delay windows are evicted by a sweep.
pub const EVICT_AFTER_WINDOWS: u32 = 4;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Directory does not exist or is not a directory: {0}")]
    WatchDirectoryMissing(PathBuf),
    #[error("This watcher has already been started")]
    AlreadyStarted,
    #[error("Filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Event consumer thread panicked")]
    ConsumerPanicked,
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Modified,
    Other,
}

/// Backend-independent filesystem event. Doubles as the debounce identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsEvent {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn modified(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            kind: FsEventKind::Modified,
        }
    }

    pub fn moved(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: Some(destination.into()),
            kind: FsEventKind::Modified,
        }
    }

    /// Normalize a raw notify event.
    ///
    /// Content writes become one `Modified` event per path. A rename
    /// reported with both ends becomes a `Modified` event carrying a
    /// destination, so it can be rejected with a message. Everything else,
    /// metadata-only changes included, is `Other`.
    pub fn from_notify(event: &notify::Event) -> Vec<FsEvent> {
        let other = |p: &PathBuf| FsEvent {
            source: p.clone(),
            destination: None,
            kind: FsEventKind::Other,
        };
        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                vec![FsEvent::moved(&event.paths[0], &event.paths[1])]
            }
            EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Metadata(_)) => {
                event.paths.iter().map(other).collect()
            }
            EventKind::Modify(_) => event
                .paths
                .iter()
                .map(|p| if p.is_dir() { other(p) } else { FsEvent::modified(p) })
                .collect(),
            _ => event.paths.iter().map(other).collect(),
        }
    }
}

// =============================================================================
// Debounce
// =============================================================================

/// Last time each event identity was seen.
#[derive(Debug)]
pub struct DebounceRecord {
    window: Duration,
    seen: HashMap<FsEvent, Instant>,
}

impl DebounceRecord {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// True if `event` repeats within the window. Refreshes the last-seen
    /// instant whether or not the event is a repeat.
    pub fn is_repeat(&mut self, event: &FsEvent, now: Instant) -> bool {
        let repeat = self
            .seen
            .get(event)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.window);
        self.seen.insert(event.clone(), now);
        if self.seen.len() > SWEEP_THRESHOLD {
            self.sweep(now);
        }
        repeat
    }

    /// Drop identities not seen for [`EVICT_AFTER_WINDOWS`] windows.
    pub fn sweep(&mut self, now: Instant) {
        let horizon = self.window * EVICT_AFTER_WINDOWS;
        self.seen
            .retain(|_, last| now.saturating_duration_since(*last) < horizon);
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// =============================================================================
// Admission
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Moved or renamed in the output tree; the build must be rerun.
    Moved { from: PathBuf, to: PathBuf },
    /// Event for a path outside the watched root.
    OutsideRoot(PathBuf),
    /// Output produced by rendering, not copied from a source file.
    Generated(PathBuf),
    /// No existing source file to write back to.
    Unpaired { path: PathBuf, paired: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Ignored,
    Debounced,
    Synchronized { source: PathBuf, paired: PathBuf },
    Rejected(RejectReason),
}

/// Applies the admission checks and performs the copy.
#[derive(Debug)]
pub struct SyncHandler {
    watch_root: PathBuf,
    result_root: PathBuf,
    debounce: DebounceRecord,
    /// Debounced events waiting for the window to close.
    pending: HashMap<FsEvent, Instant>,
}

impl SyncHandler {
    /// Both roots must already be absolute and canonical.
    pub fn new(watch_root: PathBuf, result_root: PathBuf, delay: Duration) -> Self {
        Self {
            watch_root,
            result_root,
            debounce: DebounceRecord::new(delay),
            pending: HashMap::new(),
        }
    }

    pub fn debounce(&self) -> &DebounceRecord {
        &self.debounce
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Source-tree counterpart of a path below the watched root.
    pub fn paired_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.watch_root)
            .ok()
            .map(|rel| self.result_root.join(rel))
    }

    /// Admit one event observed at `now`. Only the final copy can fail.
    pub fn handle(&mut self, event: &FsEvent, now: Instant) -> io::Result<SyncOutcome> {
        if event.kind != FsEventKind::Modified {
            return Ok(SyncOutcome::Ignored);
        }
        if self.debounce.is_repeat(event, now) {
            self.pending.insert(event.clone(), now);
            return Ok(SyncOutcome::Debounced);
        }
        self.pending.remove(event);
        let paired = match self.pair_for(event) {
            Ok(paired) => paired,
            Err(reason) => return Ok(SyncOutcome::Rejected(reason)),
        };
        copy_preserving(&event.source, &paired)?;
        Ok(SyncOutcome::Synchronized {
            source: event.source.clone(),
            paired,
        })
    }

    /// Reconcile pending events whose last sighting is a full window before
    /// `now`.
    ///
    /// Each is re-checked and copied only when the pair's bytes differ from
    /// the watched file. Rejections are dropped without a report since the
    /// first sighting already reported them.
    pub fn flush_due(&mut self, now: Instant) -> Vec<SyncReport> {
        let window = self.debounce.window();
        let due: Vec<FsEvent> = self
            .pending
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= window)
            .map(|(event, _)| event.clone())
            .collect();

        let mut reports = Vec::new();
        for event in due {
            self.pending.remove(&event);
            let Ok(paired) = self.pair_for(&event) else {
                continue;
            };
            let copied = differs(&event.source, &paired).and_then(|changed| {
                if changed {
                    copy_preserving(&event.source, &paired)?;
                }
                Ok(changed)
            });
            match copied {
                Ok(true) => reports.push(SyncReport::Outcome(SyncOutcome::Synchronized {
                    source: event.source.clone(),
                    paired,
                })),
                Ok(false) => {}
                Err(e) => reports.push(SyncReport::Failed {
                    path: event.source.clone(),
                    error: e.to_string(),
                }),
            }
        }
        reports
    }

    /// Admission checks after the debounce: the paired source path, or why
    /// there is none.
    fn pair_for(&self, event: &FsEvent) -> Result<PathBuf, RejectReason> {
        if let Some(to) = &event.destination {
            return Err(RejectReason::Moved {
                from: event.source.clone(),
                to: to.clone(),
            });
        }
        let Some(paired) = self.paired_path(&event.source) else {
            return Err(RejectReason::OutsideRoot(event.source.clone()));
        };
        if self.is_generated(&event.source) {
            return Err(RejectReason::Generated(event.source.clone()));
        }
        if !paired.is_file() {
            return Err(RejectReason::Unpaired {
                path: event.source.clone(),
                paired,
            });
        }
        Ok(paired)
    }

    /// Files the build writes itself.
    fn is_generated(&self, path: &Path) -> bool {
        is_page(path)
            || path == self.watch_root.join(MANIFEST_PATH)
            || path == self.watch_root.join(SITEMAP_FILE)
    }
}

/// True if the two files' contents differ.
fn differs(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(true);
    }
    Ok(fs::read(a)? != fs::read(b)?)
}

// =============================================================================
// Watcher
// =============================================================================

/// What the consumer reports for each admitted or failed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    Outcome(SyncOutcome),
    Failed { path: PathBuf, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Stopped,
}

#[derive(Debug)]
pub struct SyncWatcher {
    watch_dir: PathBuf,
    result_dir: PathBuf,
    buffer_delay: Duration,
    state: WatchState,
}

impl SyncWatcher {
    /// Watch `watch_dir` (the output tree), writing back into `result_dir`.
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        buffer_delay: Duration,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            result_dir: result_dir.into(),
            buffer_delay,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Watch until `shutdown` is set or the event consumer stops.
    ///
    /// Blocks the calling thread. Reports go to `reports` when given.
    /// A stopped watcher cannot be started again.
    pub fn watch(
        &mut self,
        shutdown: &AtomicBool,
        reports: Option<Sender<SyncReport>>,
    ) -> Result<(), SyncError> {
        if self.state != WatchState::Idle {
            return Err(SyncError::AlreadyStarted);
        }
        let watch_root = existing_dir(&self.watch_dir)?;
        let result_root = existing_dir(&self.result_dir)?;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&watch_root, RecursiveMode::Recursive)?;
        self.state = WatchState::Watching;

        let mut handler = SyncHandler::new(watch_root, result_root, self.buffer_delay);
        let consumer = thread::spawn(move || consume(rx, &mut handler, reports.as_ref()));

        while !shutdown.load(Ordering::SeqCst) && !consumer.is_finished() {
            thread::sleep(self.buffer_delay);
        }

        // Dropping the watcher closes the channel and ends the consumer loop.
        drop(watcher);
        let joined = consumer.join();
        self.state = WatchState::Stopped;
        joined.map_err(|_| SyncError::ConsumerPanicked)?
    }
}

fn existing_dir(path: &Path) -> Result<PathBuf, SyncError> {
    if !path.is_dir() {
        return Err(SyncError::WatchDirectoryMissing(path.to_path_buf()));
    }
    path.canonicalize()
        .map_err(|_| SyncError::WatchDirectoryMissing(path.to_path_buf()))
}

fn consume(
    rx: Receiver<notify::Result<notify::Event>>,
    handler: &mut SyncHandler,
    reports: Option<&Sender<SyncReport>>,
) -> Result<(), SyncError> {
    let send = |report: SyncReport| {
        if let Some(tx) = reports {
            let _ = tx.send(report);
        }
    };
    let window = handler.debounce().window();
    loop {
        match rx.recv_timeout(window) {
            Ok(res) => {
                let event = res?;
                for fs_event in FsEvent::from_notify(&event) {
                    send(match handler.handle(&fs_event, Instant::now()) {
                        Ok(outcome) => SyncReport::Outcome(outcome),
                        Err(e) => SyncReport::Failed {
                            path: fs_event.source.clone(),
                            error: e.to_string(),
                        },
                    });
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        handler.flush_due(Instant::now()).into_iter().for_each(&send);
    }
    // Channel closed: settle whatever is still pending.
    handler
        .flush_due(Instant::now() + window)
        .into_iter()
        .for_each(&send);
    Ok(())
}
