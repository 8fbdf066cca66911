/// A named, dated snapshot of folders on one drive.
///
/// The scan owns its folders by value, keyed by path. Its total size is the
/// sum of every folder's baseline (`original_size`); when an update pass has
/// run, `updated` also records the sum of current sizes at that moment.
/// Both totals are recomputed after every mutation rather than adjusted
/// incrementally so they cannot drift from the folder set.
use super::folder::{FileManifest, Folder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Separator between the drive identifier and the scan name in filenames.
const FILENAME_SEPARATOR: char = '-';

/// Stem used for drives whose root reduces to nothing (e.g. `/`).
const ROOT_DRIVE_ID: &str = "root";

/// Identity of a scan: the `(drive, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScanKey {
    pub drive: PathBuf,
    pub name: String,
}

impl ScanKey {
    pub fn new(drive: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            drive: drive.into(),
            name: name.into(),
        }
    }

    /// The persistence stem for this key. See [`derive_filename`].
    pub fn filename(&self) -> String {
        derive_filename(&self.drive, &self.name)
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" on {}", self.name, self.drive.display())
    }
}

/// When the last update pass ran and the current-size total it measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMark {
    pub date: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct Scan {
    name: String,
    drive: PathBuf,
    created: DateTime<Utc>,
    size: u64,
    folders: BTreeMap<PathBuf, Folder>,
    updated: Option<UpdateMark>,
}

impl Scan {
    /// Create a scan dated now.
    pub fn new(
        name: impl Into<String>,
        drive: impl Into<PathBuf>,
        folders: impl IntoIterator<Item = Folder>,
    ) -> Self {
        Self::with_date(name, drive, folders, Utc::now())
    }

    /// Create a scan with an explicit creation date.
    pub fn with_date(
        name: impl Into<String>,
        drive: impl Into<PathBuf>,
        folders: impl IntoIterator<Item = Folder>,
        created: DateTime<Utc>,
    ) -> Self {
        let folders: BTreeMap<PathBuf, Folder> = folders
            .into_iter()
            .map(|folder| (folder.path().to_path_buf(), folder))
            .collect();
        let size = compute_total_size(folders.values());
        Self {
            name: name.into(),
            drive: drive.into(),
            created,
            size,
            folders,
            updated: None,
        }
    }

    /// Rebuild a scan from persisted fields. Totals are re-derived from the
    /// folders; the stored update mark is kept as written.
    pub(crate) fn restore(
        name: String,
        drive: PathBuf,
        created: DateTime<Utc>,
        folders: Vec<Folder>,
        updated: Option<UpdateMark>,
    ) -> Self {
        let mut scan = Self::with_date(name, drive, folders, created);
        scan.updated = updated;
        scan
    }

    /// The same snapshot under another name: folders, dates and totals are
    /// shared, only the identity (and therefore the filename) changes.
    pub fn renamed(&self, new_name: impl Into<String>) -> Self {
        Self {
            name: new_name.into(),
            ..self.clone()
        }
    }

    pub fn key(&self) -> ScanKey {
        ScanKey::new(self.drive.clone(), self.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drive(&self) -> &Path {
        &self.drive
    }

    /// Persistence stem derived from `(drive, name)`.
    pub fn filename(&self) -> String {
        derive_filename(&self.drive, &self.name)
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Sum of the folders' baseline sizes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn updated(&self) -> Option<UpdateMark> {
        self.updated
    }

    pub fn is_updated(&self) -> bool {
        self.updated.is_some()
    }

    /// Folders ordered by path.
    pub fn folders(&self) -> impl ExactSizeIterator<Item = &Folder> + '_ {
        self.folders.values()
    }

    pub fn folder(&self, path: &Path) -> Option<&Folder> {
        self.folders.get(path)
    }

    pub fn contains_folder(&self, path: &Path) -> bool {
        self.folders.contains_key(path)
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn file_count(&self) -> usize {
        self.folders.values().map(Folder::file_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Record a completed update pass.
    pub fn mark_updated(&mut self, date: DateTime<Utc>) {
        self.updated = Some(UpdateMark {
            date,
            size: current_total_size(self.folders.values()),
        });
    }

    /// Union the folders of `sources` into this scan.
    ///
    /// Folders already present are kept as they are. A source with the same
    /// key as `self` contributes nothing. The update mark is cleared: after a
    /// merge the scan only describes a fresh baseline.
    pub fn merge<'a>(&mut self, sources: impl IntoIterator<Item = &'a Scan>) {
        let own_key = self.key();
        for source in sources {
            if source.key() == own_key {
                continue;
            }
            for folder in source.folders() {
                self.folders
                    .entry(folder.path().to_path_buf())
                    .or_insert_with(|| folder.clone());
            }
        }
        self.size = compute_total_size(self.folders.values());
        self.updated = None;
    }

    /// Insert folders arriving from another scan, re-baselining each one.
    pub fn add_folders(&mut self, folders: impl IntoIterator<Item = Folder>) {
        for mut folder in folders {
            folder.reset_state();
            self.folders
                .entry(folder.path().to_path_buf())
                .or_insert(folder);
        }
        self.size = compute_total_size(self.folders.values());
        self.updated = None;
    }

    /// Remove folders by path, returning those that were present.
    ///
    /// The baseline total drops by their original sizes and, when the scan
    /// is marked updated, the updated total drops by their current sizes.
    pub fn remove_folders<P: AsRef<Path>>(
        &mut self,
        paths: impl IntoIterator<Item = P>,
    ) -> Vec<Folder> {
        let removed: Vec<Folder> = paths
            .into_iter()
            .filter_map(|path| self.folders.remove(path.as_ref()))
            .collect();
        self.size = compute_total_size(self.folders.values());
        if let Some(mark) = self.updated.as_mut() {
            mark.size = current_total_size(self.folders.values());
        }
        removed
    }

    /// Apply staged measurements from an update pass. Paths that are not
    /// part of the scan are ignored.
    pub(crate) fn apply_measurements(
        &mut self,
        measurements: impl IntoIterator<Item = (PathBuf, Option<FileManifest>)>,
    ) {
        for (path, files) in measurements {
            if let Some(folder) = self.folders.get_mut(&path) {
                folder.recompute(files);
            }
        }
        self.size = compute_total_size(self.folders.values());
    }
}

impl PartialEq for Scan {
    fn eq(&self, other: &Self) -> bool {
        self.drive == other.drive && self.name == other.name
    }
}

impl Eq for Scan {}

/// Sum of `original_size` over `folders`.
pub fn compute_total_size<'a>(folders: impl IntoIterator<Item = &'a Folder>) -> u64 {
    folders
        .into_iter()
        .fold(0u64, |acc, f| acc.saturating_add(f.original_size()))
}

fn current_total_size<'a>(folders: impl IntoIterator<Item = &'a Folder>) -> u64 {
    folders
        .into_iter()
        .fold(0u64, |acc, f| acc.saturating_add(f.current_size()))
}

/// Map `(drive, name)` to a filesystem-safe persistence stem.
///
/// The drive identifier is the drive root without trailing separators or
/// colon (`C:\` becomes `c`, `/mnt/data` becomes `%2fmnt%2fdata`, `/`
/// becomes `root`). Both parts are case-folded and every character that is
/// illegal in filenames, plus `%` and the `-` separator, is percent-encoded,
/// so distinct pairs never collide unless they differ only by case.
pub fn derive_filename(drive: &Path, name: &str) -> String {
    let drive_str = drive.to_string_lossy();
    let trimmed = drive_str
        .trim_end_matches(['\\', '/'])
        .trim_end_matches(':');
    let drive_id = if trimmed.is_empty() {
        ROOT_DRIVE_ID.to_string()
    } else {
        normalize_component(trimmed)
    };
    format!("{drive_id}{FILENAME_SEPARATOR}{}", normalize_component(name))
}

fn normalize_component(raw: &str) -> String {
    let folded = raw.to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut chars = folded.chars().peekable();
    while let Some(ch) = chars.next() {
        let is_last = chars.peek().is_none();
        // Windows silently drops a trailing dot or space from filenames.
        let needs_escape = matches!(
            ch,
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '%' | FILENAME_SEPARATOR
        ) || ch.is_control()
            || (is_last && (ch == '.' || ch == ' '));
        if needs_escape {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02x}"));
            }
        } else {
            out.push(ch);
        }
    }
    out
}
