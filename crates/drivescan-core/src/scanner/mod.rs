/// Scanner module: builds new scans and refreshes existing ones.
///
/// The crawl itself ([`crawl::scan_drive`], [`crawl::update_scan`]) is
/// synchronous. [`start_scan`] and [`start_update`] run it on a named
/// background thread and return a [`TaskHandle`] the caller can poll for
/// progress, cancel, and finally `wait()` on for the result.
///
/// Neither path touches the repository: the caller commits the result.
pub mod crawl;
pub mod progress;

pub use crawl::{measure_folder, scan_drive, update_scan};
pub use progress::{CancelToken, Cancelled, ProgressSink, ScanProgress};

use crate::model::Scan;
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::thread;
use thiserror::Error;
use tracing::info;

/// Maximum number of progress messages that may queue up in the channel.
///
/// The scanner never blocks on a full channel; surplus status messages are
/// dropped, so this only bounds memory.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan was cancelled")]
    Cancelled,

    #[error("cannot read drive root {}: {source}", path.display())]
    DriveUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn scanner thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("scanner thread panicked")]
    WorkerPanicked,
}

impl From<Cancelled> for ScanError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Handle to a scan or update running on a background thread.
pub struct TaskHandle<T> {
    /// Status messages from the worker. Lossy; see [`ProgressSink`].
    pub progress_rx: Receiver<ScanProgress>,
    cancel: CancelToken,
    thread: thread::JoinHandle<Result<T, ScanError>>,
}

impl<T> TaskHandle<T> {
    /// Request the worker to stop as soon as possible.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A clone of the token the worker polls.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// `true` once the worker has returned; `wait` will not block.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the worker finishes and return its result.
    pub fn wait(self) -> Result<T, ScanError> {
        self.thread.join().map_err(|_| ScanError::WorkerPanicked)?
    }
}

fn spawn<T, F>(label: &str, job: F) -> Result<TaskHandle<T>, ScanError>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken, &ProgressSink) -> Result<T, ScanError> + Send + 'static,
{
    let (sink, progress_rx) = ProgressSink::channel(PROGRESS_CHANNEL_CAPACITY);
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let thread = thread::Builder::new()
        .name(format!("drivescan-{label}"))
        .spawn(move || job(&worker_cancel, &sink))
        .map_err(ScanError::Spawn)?;

    Ok(TaskHandle {
        progress_rx,
        cancel,
        thread,
    })
}

/// Start a fresh scan of `drive` on a background thread.
///
/// `existing` holds the folders already recorded by other scans of the drive
/// (see [`crate::repository::Catalog::drive_folders`]).
pub fn start_scan(
    name: String,
    drive: PathBuf,
    existing: HashSet<PathBuf>,
) -> Result<TaskHandle<Option<Scan>>, ScanError> {
    info!("Starting scan \"{name}\" of {}", drive.display());
    spawn("scanner", move |cancel, sink| {
        scan_drive(&name, &drive, &existing, cancel, sink)
    })
}

/// Start an update pass over a copy of `scan` on a background thread.
///
/// The worker returns the refreshed copy; commit it with
/// [`crate::repository::Repository::update_scan`].
pub fn start_update(scan: Scan) -> Result<TaskHandle<Scan>, ScanError> {
    info!("Starting update of \"{}\"", scan.name());
    spawn("updater", move |cancel, sink| update_scan(&scan, cancel, sink))
}
