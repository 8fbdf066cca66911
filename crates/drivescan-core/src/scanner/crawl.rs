/// The folder crawler: fresh scans and update passes.
///
/// Both operations are single-threaded and synchronous; [`super::start_scan`]
/// and [`super::start_update`] move them onto a background thread.
///
/// Cancellation is polled before every file measurement and before every
/// directory descent, so a stop request takes effect within one step. A
/// folder is never left half-measured: its manifest is built completely
/// before it is recorded or applied.
use super::progress::{CancelToken, Cancelled, ScanProgress, ProgressSink};
use super::ScanError;
use crate::model::{FileManifest, Folder, Scan};
use chrono::Utc;
use compact_str::CompactString;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Walk `drive` and record every folder not already in `existing`.
///
/// Folders listed in `existing` (owned by other scans of the same drive) are
/// not re-registered, but the walk still descends through them. Directories
/// that cannot be listed are skipped together with their subtree.
///
/// A relative `drive` is resolved against the working directory, so every
/// recorded folder path is absolute. Directories whose path is not valid
/// Unicode cannot be stored in a record and are treated as unreadable.
///
/// Returns `Ok(None)` when the walk completed without recording anything
/// new; the caller decides whether such a scan is worth keeping.
pub fn scan_drive(
    name: &str,
    drive: &Path,
    existing: &HashSet<PathBuf>,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<Option<Scan>, ScanError> {
    let start = Instant::now();
    let root = std::path::absolute(drive).map_err(|source| ScanError::DriveUnreadable {
        path: drive.to_path_buf(),
        source,
    })?;
    let drive = root.as_path();
    let mut recorded: Vec<Folder> = Vec::new();
    let mut visited: u64 = 0;
    let mut stack: Vec<PathBuf> = vec![drive.to_path_buf()];

    while let Some(dir) = stack.pop() {
        cancel.check()?;

        let listed = if dir.to_str().is_some() {
            list_dir(&dir)
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "path is not valid Unicode",
            ))
        };
        let entries = match listed {
            Ok(entries) => entries,
            Err(err) if dir == drive => {
                return Err(ScanError::DriveUnreadable {
                    path: dir,
                    source: err,
                });
            }
            Err(err) => {
                report_unreadable(progress, &dir, &err);
                continue;
            }
        };

        if !existing.contains(&dir) {
            let files = measure_entries(&entries, cancel)?;
            recorded.push(Folder::measured(dir.clone(), files));
        }

        visited += 1;
        progress.emit(ScanProgress::Visiting {
            current_path: dir.to_string_lossy().into_owned(),
            folders_done: visited,
        });

        let mut subdirs: Vec<PathBuf> = entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Dir)
            .map(|entry| entry.path.clone())
            .collect();
        // Reverse so the stack pops subdirectories in name order.
        subdirs.sort_unstable_by(|a, b| b.cmp(a));
        stack.extend(subdirs);
    }

    info!(
        "Scan \"{name}\" of {} finished: {} folders visited, {} new, in {:?}",
        drive.display(),
        visited,
        recorded.len(),
        start.elapsed()
    );

    if recorded.is_empty() {
        return Ok(None);
    }
    Ok(Some(Scan::new(name, drive, recorded)))
}

/// Re-measure every folder of `scan` and return the refreshed copy.
///
/// All measurements are staged first and applied only once the whole pass
/// has completed, so a cancelled update leaves no trace. The original scan is
/// never touched; the caller commits the returned copy through the
/// repository.
pub fn update_scan(
    scan: &Scan,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<Scan, ScanError> {
    let start = Instant::now();
    let mut staged: Vec<(PathBuf, Option<FileManifest>)> = Vec::with_capacity(scan.folder_count());

    for (done, folder) in scan.folders().enumerate() {
        cancel.check()?;
        let measured = measure_folder(folder.path(), cancel, progress)?;
        staged.push((folder.path().to_path_buf(), measured));

        progress.emit(ScanProgress::Visiting {
            current_path: folder.path().to_string_lossy().into_owned(),
            folders_done: done as u64 + 1,
        });
    }

    let mut refreshed = scan.clone();
    refreshed.apply_measurements(staged);
    refreshed.mark_updated(Utc::now());

    info!(
        "Update of \"{}\" finished: {} folders re-measured in {:?}",
        scan.name(),
        scan.folder_count(),
        start.elapsed()
    );
    Ok(refreshed)
}

/// Measure the immediate files of one directory.
///
/// `Ok(None)` means the directory could not be listed.
pub fn measure_folder(
    path: &Path,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<Option<FileManifest>, Cancelled> {
    match list_dir(path) {
        Ok(entries) => measure_entries(&entries, cancel).map(Some),
        Err(err) => {
            report_unreadable(progress, path, &err);
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    /// Symlinks and special files: neither measured nor descended into.
    Other,
}

struct Entry {
    name: CompactString,
    path: PathBuf,
    kind: EntryKind,
}

/// List a directory, classifying children without following symlinks.
///
/// Children whose type cannot be determined are treated as `Other`.
fn list_dir(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping unreadable entry in {}: {err}", dir.display());
                continue;
            }
        };
        let kind = match entry.file_type() {
            Ok(t) if t.is_file() => EntryKind::File,
            Ok(t) if t.is_dir() => EntryKind::Dir,
            _ => EntryKind::Other,
        };
        entries.push(Entry {
            name: manifest_name(&entry.file_name()),
            path: entry.path(),
            kind,
        });
    }
    Ok(entries)
}

/// Manifest key for a file name. Names that are not valid Unicode are
/// escaped byte by byte so that distinct names keep distinct keys.
fn manifest_name(name: &OsStr) -> CompactString {
    match name.to_str() {
        Some(name) => CompactString::new(name),
        None => CompactString::new(format!("{name:?}")),
    }
}

fn measure_entries(entries: &[Entry], cancel: &CancelToken) -> Result<FileManifest, Cancelled> {
    let mut files = FileManifest::new();
    for entry in entries.iter().filter(|e| e.kind == EntryKind::File) {
        cancel.check()?;
        match fs::symlink_metadata(&entry.path) {
            Ok(meta) => {
                *files.entry(entry.name.clone()).or_default() += meta.len();
            }
            Err(err) => debug!("Cannot stat {}: {err}", entry.path.display()),
        }
    }
    Ok(files)
}

fn report_unreadable(progress: &ProgressSink, path: &Path, err: &io::Error) {
    warn!("Cannot read folder {}: {err}", path.display());
    progress.emit(ScanProgress::Unreadable {
        path: path.to_string_lossy().into_owned(),
        message: err.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FolderState;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, n: usize) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(&vec![0u8; n]).unwrap();
    }

    #[test]
    fn measure_folder_lists_only_files() {
        let tmp = TempDir::new().unwrap();
        write_bytes(&tmp.path().join("a.txt"), 30);
        fs::create_dir(tmp.path().join("sub")).unwrap();
        write_bytes(&tmp.path().join("sub").join("deep.txt"), 500);

        let files = measure_folder(tmp.path(), &CancelToken::new(), &ProgressSink::disabled())
            .unwrap()
            .expect("temp dir is readable");

        assert_eq!(files.len(), 1);
        assert_eq!(files.get("a.txt"), Some(&30));
    }

    #[test]
    fn measure_missing_folder_is_none() {
        let tmp = TempDir::new().unwrap();
        let (sink, rx) = ProgressSink::channel(8);
        let result = measure_folder(&tmp.path().join("nope"), &CancelToken::new(), &sink);
        assert_eq!(result, Ok(None));
        assert!(matches!(rx.try_recv(), Ok(ScanProgress::Unreadable { .. })));
    }

    #[test]
    fn cancelled_measurement_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        write_bytes(&tmp.path().join("a.txt"), 1);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = measure_folder(tmp.path(), &cancel, &ProgressSink::disabled());
        assert_eq!(result, Err(Cancelled));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn files_with_non_unicode_names_are_all_counted() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        write_bytes(&tmp.path().join(OsStr::from_bytes(b"a\xfe")), 10);
        write_bytes(&tmp.path().join(OsStr::from_bytes(b"a\xff")), 20);

        let files = measure_folder(tmp.path(), &CancelToken::new(), &ProgressSink::disabled())
            .unwrap()
            .expect("temp dir is readable");

        assert_eq!(files.len(), 2);
        assert_eq!(files.values().sum::<u64>(), 30);
    }

    #[test]
    fn update_counts_folders_after_measuring() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        let scan = scan_drive(
            "s",
            tmp.path(),
            &HashSet::new(),
            &CancelToken::new(),
            &ProgressSink::disabled(),
        )
        .unwrap()
        .unwrap();

        let (sink, rx) = ProgressSink::channel(16);
        update_scan(&scan, &CancelToken::new(), &sink).unwrap();
        drop(sink);

        let counts: Vec<u64> = rx
            .iter()
            .filter_map(|msg| match msg {
                ScanProgress::Visiting { folders_done, .. } => Some(folders_done),
                ScanProgress::Unreadable { .. } => None,
            })
            .collect();
        assert_eq!(counts, [1, 2]);
    }

    #[test]
    fn update_marks_vanished_folder_deleted() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("gone");
        fs::create_dir(&sub).unwrap();
        write_bytes(&sub.join("x.bin"), 64);

        let scan = scan_drive(
            "s",
            tmp.path(),
            &HashSet::new(),
            &CancelToken::new(),
            &ProgressSink::disabled(),
        )
        .unwrap()
        .expect("new folders were recorded");
        fs::remove_dir_all(&sub).unwrap();

        let refreshed =
            update_scan(&scan, &CancelToken::new(), &ProgressSink::disabled()).unwrap();

        let folder = refreshed.folder(&sub).expect("folder stays in the scan");
        assert_eq!(folder.state(), FolderState::Deleted);
        assert_eq!(folder.current_size(), 0);
        assert_eq!(refreshed.updated().map(|m| m.size), Some(0));
        assert_eq!(scan.folder(&sub).map(Folder::state), Some(FolderState::Unchanged));
    }
}
