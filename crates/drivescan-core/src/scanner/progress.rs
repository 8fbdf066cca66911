/// Progress reporting and cancellation shared between a scan thread and the
/// caller.
///
/// Progress is a lossy side channel: when the caller falls behind and the
/// bounded channel is full, status messages are dropped instead of stalling
/// the crawl.
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status updates sent from the scan thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanProgress {
    /// A folder decision was made (recorded, skipped, or re-measured).
    Visiting {
        current_path: String,
        folders_done: u64,
    },
    /// A directory could not be listed. Not fatal: during a fresh scan the
    /// directory is left out, during an update its folder becomes `Deleted`.
    Unreadable { path: String, message: String },
}

/// Sending half of the progress channel. A disabled sink drops everything.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<Sender<ScanProgress>>,
}

impl ProgressSink {
    pub fn new(tx: Sender<ScanProgress>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards every message.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a bounded channel and its sink.
    pub fn channel(capacity: usize) -> (Self, Receiver<ScanProgress>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    /// Send without blocking. Full or disconnected channels drop the message.
    pub fn emit(&self, message: ScanProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(message);
        }
    }
}

/// Returned by a crawl that observed a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Cooperative cancellation flag, cheap to clone across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    #[inline]
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sink, rx) = ProgressSink::channel(1);
        for i in 0..10 {
            sink.emit(ScanProgress::Visiting {
                current_path: format!("/dir{i}"),
                folders_done: i,
            });
        }
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn disconnected_receiver_is_ignored() {
        let (sink, rx) = ProgressSink::channel(4);
        drop(rx);
        sink.emit(ScanProgress::Unreadable {
            path: "/x".into(),
            message: "gone".into(),
        });
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert_eq!(clone.check(), Ok(()));
        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(Cancelled));
    }
}
