/// A single recorded directory and its change state.
///
/// A `Folder` is identified by its absolute path alone: two folders compare
/// equal when their paths do, and they order by path so folder sets iterate
/// deterministically. Everything else (sizes, manifest, state) is mutable
/// measurement data that the scanner refreshes on every update pass.
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Immediate child files of a directory: file name to length in bytes.
///
/// Never contains subdirectories.
pub type FileManifest = BTreeMap<CompactString, u64>;

/// How a folder's aggregate size relates to its previous measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderState {
    Unchanged,
    Increased,
    Decreased,
    /// The directory could not be read (removed or access revoked).
    Deleted,
}

impl FolderState {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    path: PathBuf,
    /// Size when the folder entered its current scan. Baseline for totals.
    original_size: u64,
    /// Size at the most recent measurement.
    current_size: u64,
    state: FolderState,
    files: FileManifest,
    /// `false` until the first call to [`Folder::recompute`].
    measured: bool,
}

impl Folder {
    /// Create an unmeasured folder: state `Unchanged`, both sizes zero.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            original_size: 0,
            current_size: 0,
            state: FolderState::Unchanged,
            files: FileManifest::new(),
            measured: false,
        }
    }

    /// Create a folder and give it its first measurement in one step.
    pub fn measured(path: impl Into<PathBuf>, files: FileManifest) -> Self {
        let mut folder = Self::new(path);
        folder.recompute(Some(files));
        folder
    }

    /// Rebuild a folder from persisted fields without re-deriving its state.
    pub(crate) fn restore(
        path: PathBuf,
        original_size: u64,
        current_size: u64,
        state: FolderState,
        files: FileManifest,
    ) -> Self {
        Self {
            path,
            original_size,
            current_size,
            state,
            files,
            measured: true,
        }
    }

    /// Apply a new measurement.
    ///
    /// `None` means the directory could not be listed: the folder becomes
    /// `Deleted` with size zero and an empty manifest. Otherwise the size is
    /// the sum of the manifest and the state compares it with the previous
    /// measurement. The baseline (`original_size`) is only set on the very
    /// first measurement; later baselines come from [`Folder::reset_state`].
    pub fn recompute(&mut self, new_files: Option<FileManifest>) {
        let Some(files) = new_files else {
            self.state = FolderState::Deleted;
            self.current_size = 0;
            self.files = FileManifest::new();
            self.measured = true;
            return;
        };

        let size = manifest_size(&files);
        if self.measured {
            self.state = match size.cmp(&self.current_size) {
                Ordering::Equal => FolderState::Unchanged,
                Ordering::Greater => FolderState::Increased,
                Ordering::Less => FolderState::Decreased,
            };
        } else {
            self.state = FolderState::Unchanged;
            self.original_size = size;
        }
        self.current_size = size;
        self.files = files;
        self.measured = true;
    }

    /// Re-baseline the folder on its current size.
    ///
    /// Called when a folder crosses into another scan so that the receiving
    /// scan's totals are coherent.
    pub fn reset_state(&mut self) {
        self.state = FolderState::Unchanged;
        self.original_size = self.current_size;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn state(&self) -> FolderState {
        self.state
    }

    pub fn files(&self) -> &FileManifest {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// `current_size - original_size`, saturated to the `i64` range.
    pub fn size_change(&self) -> i64 {
        let delta = i128::from(self.current_size) - i128::from(self.original_size);
        delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

/// Sum of every file length in a manifest.
pub fn manifest_size(files: &FileManifest) -> u64 {
    files.values().fold(0u64, |acc, &len| acc.saturating_add(len))
}

impl PartialEq for Folder {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Folder {}

impl Hash for Folder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for Folder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Folder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}
