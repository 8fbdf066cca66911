/// Repository: durable scan records plus the in-memory catalog.
///
/// One JSON record per scan lives in the history folder. Every mutation
/// follows the same discipline: build the new scan(s) off to the side, write
/// the record(s), and only then touch the catalog. A failed write leaves the
/// catalog exactly as it was.
///
/// Writes go to a `.tmp` sibling first and are renamed into place, so an
/// interrupted write never truncates an existing record.
///
/// The repository performs no locking. Callers serialize mutating calls.
pub mod catalog;
pub mod error;
pub mod record;

pub use catalog::Catalog;
pub use error::{ErrorKind, RepositoryError, Result};
pub use record::RECORD_FORMAT_VERSION;

use crate::config::{Settings, RECORD_EXTENSION};
use crate::model::{derive_filename, Folder, Scan, ScanKey};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension appended to a record filename while it is being written.
const STAGING_EXTENSION: &str = "tmp";

/// A record that could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    /// File name inside the history folder.
    pub filename: String,
    pub error: RepositoryError,
}

/// Result of [`Repository::merge_scans`].
#[derive(Debug)]
pub struct MergeOutcome {
    pub merged: ScanKey,
    /// Sources whose record could not be deleted. They stay in the catalog.
    pub stale_sources: Vec<(ScanKey, RepositoryError)>,
}

/// Result of removing folders from a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderEdit {
    /// The scan was rewritten with its remaining folders.
    Saved(ScanKey),
    /// No folders remained, so the scan and its record were deleted.
    Deleted,
}

/// Result of moving folders between scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moved {
    /// The source scan, or `None` when it was emptied and deleted.
    pub from: Option<ScanKey>,
    pub to: ScanKey,
}

#[derive(Debug)]
pub struct Repository {
    dir: PathBuf,
    catalog: Catalog,
}

impl Repository {
    /// Open the history folder described by `settings`, creating it if
    /// needed. The catalog starts empty; call [`Repository::load`].
    pub fn open(settings: &Settings) -> Result<Self> {
        let dir = settings.history_dir.clone();
        fs::create_dir_all(&dir).map_err(|e| RepositoryError::from_io(&dir, e))?;
        debug!("Opened history folder {}", dir.display());
        Ok(Self {
            dir,
            catalog: Catalog::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Rebuild the catalog from every record in the history folder.
    ///
    /// Records that cannot be read, decoded, or placed are collected as
    /// failures; they never stop the rest from loading. Leftover staging
    /// files from an interrupted write are removed. Only a failure to list
    /// the folder itself is returned as an error.
    pub fn load(&mut self) -> Result<Vec<LoadFailure>> {
        let listing = fs::read_dir(&self.dir).map_err(|e| RepositoryError::from_io(&self.dir, e))?;
        let mut paths: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        let mut catalog = Catalog::new();
        let mut failures = Vec::new();

        for path in paths {
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            else {
                continue;
            };
            match path.extension().and_then(|e| e.to_str()) {
                Some(STAGING_EXTENSION) => {
                    debug!("Removing stale staging file {filename}");
                    discard_staged(&path);
                    continue;
                }
                Some(RECORD_EXTENSION) => {}
                _ => continue,
            }

            match read_record(&path) {
                Ok(scan) => {
                    let key = scan.key();
                    let expected = record_filename(&scan.filename());
                    if expected != filename {
                        warn!("Record {filename} holds {key}; expected file {expected}");
                        failures.push(LoadFailure {
                            filename,
                            error: RepositoryError::MisplacedRecord {
                                path,
                                key,
                                expected,
                            },
                        });
                    } else if !catalog.insert(scan) {
                        failures.push(LoadFailure {
                            filename,
                            error: RepositoryError::DuplicateName { key },
                        });
                    } else {
                        debug!("Loaded {key} from {filename}");
                    }
                }
                Err(error) => {
                    warn!("Cannot load record {filename}: {error}");
                    failures.push(LoadFailure { filename, error });
                }
            }
        }

        info!(
            "Loaded {} scans from {} ({} failed)",
            catalog.len(),
            self.dir.display(),
            failures.len()
        );
        self.catalog = catalog;
        Ok(failures)
    }

    /// `true` if a scan `(drive, name)` is indexed or its record file exists.
    /// Names differing only by letter case map to the same record.
    pub fn exists_scan(&self, drive: &Path, name: &str) -> bool {
        self.catalog.contains(&ScanKey::new(drive, name))
            || self.record_path(&derive_filename(drive, name)).exists()
    }

    /// Persist a new scan, then index it.
    pub fn add_scan(&mut self, scan: Scan) -> Result<&Scan> {
        let key = scan.key();
        if scan.is_empty() {
            return Err(RepositoryError::EmptyScan { key });
        }
        if self.exists_scan(scan.drive(), scan.name()) {
            return Err(RepositoryError::DuplicateName { key });
        }
        self.save(&scan)?;
        info!("Added scan {key} ({} folders)", scan.folder_count());
        self.catalog.insert(scan);
        self.indexed(&key)
    }

    /// Persist a refreshed copy of an indexed scan and swap it in.
    pub fn update_scan(&mut self, scan: Scan) -> Result<&Scan> {
        let key = scan.key();
        self.indexed(&key)?;
        if scan.is_empty() {
            return Err(RepositoryError::EmptyScan { key });
        }
        self.save(&scan)?;
        info!("Saved update of {key}");
        self.catalog.replace(&key, scan);
        self.indexed(&key)
    }

    /// Give a scan a new name.
    ///
    /// The new record is written before the old one is deleted. If the old
    /// record cannot be deleted the new one is removed again, and the scan
    /// stays under its old name.
    ///
    /// A rename that only changes letter case keeps the same record file,
    /// which is rewritten in place.
    pub fn rename_scan(&mut self, key: &ScanKey, new_name: &str) -> Result<&Scan> {
        let old = self.indexed(key)?;
        let old_filename = old.filename();
        let renamed = old.renamed(new_name);
        let new_key = renamed.key();
        let same_record = renamed.filename() == old_filename;

        if new_name.trim().is_empty() {
            return Err(RepositoryError::InvalidRecordName {
                name: new_name.to_owned(),
            });
        }
        let taken = if same_record {
            self.catalog.contains(&new_key)
        } else {
            self.exists_scan(&new_key.drive, &new_key.name)
        };
        if taken {
            return Err(RepositoryError::DuplicateName { key: new_key });
        }

        self.save(&renamed)?;
        if same_record {
            info!("Renamed {key} to \"{new_name}\"");
            self.catalog.replace(key, renamed);
            return self.indexed(&new_key);
        }
        if let Err(err) = self.remove_record(&old_filename) {
            warn!("Cannot delete old record of {key}: {err}; rolling back rename");
            if let Err(undo) = self.remove_record(&renamed.filename()) {
                warn!("Rollback of {new_key} failed: {undo}");
            }
            return Err(err);
        }

        info!("Renamed {key} to \"{new_name}\"");
        self.catalog.replace(key, renamed);
        self.indexed(&new_key)
    }

    /// Delete a scan's record, then drop it from the catalog.
    pub fn delete_scan(&mut self, key: &ScanKey) -> Result<Scan> {
        let filename = self.indexed(key)?.filename();
        self.remove_record(&filename)?;
        info!("Deleted scan {key}");
        self.catalog
            .remove(key)
            .ok_or_else(|| RepositoryError::UnknownScan { key: key.clone() })
    }

    /// Drop a scan from the catalog without touching the disk. Used to clean
    /// up entries whose record has already vanished.
    pub fn forget_scan(&mut self, key: &ScanKey) -> Option<Scan> {
        let forgotten = self.catalog.remove(key);
        if forgotten.is_some() {
            warn!("Forgot scan {key} without deleting its record");
        }
        forgotten
    }

    /// Delete every scan of `drive`. Returns the scans that could not be
    /// deleted; they remain in the catalog.
    pub fn delete_scans(&mut self, drive: &Path) -> Vec<(ScanKey, RepositoryError)> {
        let keys: Vec<ScanKey> = self.catalog.drive_scans(drive).iter().map(Scan::key).collect();
        keys.into_iter()
            .filter_map(|key| self.delete_scan(&key).err().map(|err| (key, err)))
            .collect()
    }

    /// Delete record files by name, typically those reported by
    /// [`Repository::load`]. Names that are not plain record file names, or
    /// that back an indexed scan, are refused. Returns the names that could
    /// not be removed.
    pub fn delete_record_files<S: AsRef<str>>(
        &self,
        filenames: &[S],
    ) -> Vec<(String, RepositoryError)> {
        let indexed: BTreeSet<String> = self
            .catalog
            .iter()
            .map(|scan| record_filename(&scan.filename()))
            .collect();

        let mut failed = Vec::new();
        for name in filenames.iter().map(AsRef::as_ref) {
            let is_plain = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
            let is_record = Path::new(name).extension().and_then(|e| e.to_str())
                == Some(RECORD_EXTENSION);
            if !is_plain || !is_record || indexed.contains(name) {
                failed.push((
                    name.to_owned(),
                    RepositoryError::InvalidRecordName {
                        name: name.to_owned(),
                    },
                ));
                continue;
            }
            let path = self.dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => info!("Deleted record file {name}"),
                Err(e) => failed.push((name.to_owned(), RepositoryError::from_io(&path, e))),
            }
        }
        failed
    }

    /// Merge `sources` into `into`.
    ///
    /// The merged copy is written first; only then are the source records
    /// deleted. A source whose record cannot be deleted stays indexed and is
    /// reported in the outcome.
    pub fn merge_scans(&mut self, sources: &[ScanKey], into: &ScanKey) -> Result<MergeOutcome> {
        let target = self.indexed(into)?;
        let mut merged = target.clone();

        let mut source_scans: Vec<&Scan> = Vec::new();
        for key in sources {
            if key == into || source_scans.iter().any(|s| s.key() == *key) {
                continue;
            }
            let source = self.indexed(key)?;
            if source.drive() != target.drive() {
                return Err(RepositoryError::CrossDrive {
                    a: into.clone(),
                    b: key.clone(),
                });
            }
            source_scans.push(source);
        }
        merged.merge(source_scans.iter().copied());
        let source_keys: Vec<ScanKey> = source_scans.iter().map(|s| s.key()).collect();
        let source_count = source_keys.len();

        self.save(&merged)?;
        let mut stale_sources = Vec::new();
        for key in source_keys {
            match self.remove_record(&key.filename()) {
                Ok(()) => {
                    self.catalog.remove(&key);
                }
                Err(err) => {
                    warn!("Merged {key} but cannot delete its record: {err}");
                    stale_sources.push((key, err));
                }
            }
        }

        info!(
            "Merged {source_count} scans into {into} ({} folders)",
            merged.folder_count()
        );
        self.catalog.replace(into, merged);
        Ok(MergeOutcome {
            merged: into.clone(),
            stale_sources,
        })
    }

    /// Remove folders from a scan. A scan left without folders is deleted.
    pub fn delete_scan_folders(&mut self, key: &ScanKey, folders: &[PathBuf]) -> Result<FolderEdit> {
        let scan = self.indexed(key)?;
        ensure_folders(scan, folders)?;
        let mut edited = scan.clone();
        edited.remove_folders(folders);

        if edited.is_empty() {
            self.delete_scan(key)?;
            return Ok(FolderEdit::Deleted);
        }
        self.save(&edited)?;
        info!("Removed {} folders from {key}", folders.len());
        self.catalog.replace(key, edited);
        Ok(FolderEdit::Saved(key.clone()))
    }

    /// Move folders from one scan into another scan of the same drive.
    pub fn move_scan_folders(
        &mut self,
        from: &ScanKey,
        to: &ScanKey,
        folders: &[PathBuf],
    ) -> Result<Moved> {
        if from == to {
            return Err(RepositoryError::SameScan { key: from.clone() });
        }
        let source = self.indexed(from)?;
        let target = self.indexed(to)?;
        if source.drive() != target.drive() {
            return Err(RepositoryError::CrossDrive {
                a: from.clone(),
                b: to.clone(),
            });
        }
        ensure_folders(source, folders)?;

        let mut new_from = source.clone();
        let moved = new_from.remove_folders(folders);
        let mut new_to = target.clone();
        new_to.add_folders(moved);

        self.commit_move(from, new_from, true, new_to)
    }

    /// Move folders out of `from` into a brand-new scan called `name`.
    pub fn move_to_new_scan(
        &mut self,
        from: &ScanKey,
        name: &str,
        folders: &[PathBuf],
    ) -> Result<Moved> {
        let source = self.indexed(from)?;
        ensure_folders(source, folders)?;
        if name.trim().is_empty() {
            return Err(RepositoryError::InvalidRecordName {
                name: name.to_owned(),
            });
        }
        if self.exists_scan(source.drive(), name) {
            return Err(RepositoryError::DuplicateName {
                key: ScanKey::new(source.drive(), name),
            });
        }

        let mut new_from = source.clone();
        let moved = new_from.remove_folders(folders);
        if moved.is_empty() {
            return Err(RepositoryError::EmptyScan {
                key: ScanKey::new(source.drive(), name),
            });
        }
        let mut new_to = Scan::new(name, source.drive(), Vec::<Folder>::new());
        new_to.add_folders(moved);

        self.commit_move(from, new_from, false, new_to)
    }

    /// Write both sides of a move as one transaction.
    ///
    /// Both records are staged before either is committed. If the source
    /// cannot be committed after the target was, the target's previous
    /// record is rewritten (or the new target record removed). The catalog
    /// changes only after both commits succeed.
    fn commit_move(
        &mut self,
        from: &ScanKey,
        new_from: Scan,
        target_exists: bool,
        new_to: Scan,
    ) -> Result<Moved> {
        let to = new_to.key();
        let from_emptied = new_from.is_empty();

        let staged_to = self.stage(&new_to)?;
        let staged_from = if from_emptied {
            None
        } else {
            match self.stage(&new_from) {
                Ok(path) => Some(path),
                Err(err) => {
                    discard_staged(&staged_to);
                    return Err(err);
                }
            }
        };

        if let Err(err) = self.commit(&staged_to, &new_to) {
            if let Some(path) = &staged_from {
                discard_staged(path);
            }
            return Err(err);
        }

        let committed_from = match &staged_from {
            Some(path) => self.commit(path, &new_from),
            None => self.remove_record(&from.filename()),
        };
        if let Err(err) = committed_from {
            warn!("Move from {from} failed after {to} was written: {err}; rolling back");
            self.roll_back_target(&to, target_exists);
            return Err(err);
        }

        info!("Moved folders from {from} to {to}");
        if from_emptied {
            self.catalog.remove(from);
        } else {
            self.catalog.replace(from, new_from);
        }
        if target_exists {
            self.catalog.replace(&to, new_to);
        } else {
            self.catalog.insert(new_to);
        }
        Ok(Moved {
            from: (!from_emptied).then(|| from.clone()),
            to,
        })
    }

    /// Restore the record of `to` from the catalog, which still holds the
    /// pre-move state, or remove it if it did not exist before.
    fn roll_back_target(&self, to: &ScanKey, existed: bool) {
        let restored = match self.catalog.get(to) {
            Some(original) if existed => self.save(original),
            _ => self.remove_record(&to.filename()),
        };
        if let Err(err) = restored {
            warn!("Rollback of {to} failed: {err}");
        }
    }

    fn indexed(&self, key: &ScanKey) -> Result<&Scan> {
        self.catalog
            .get(key)
            .ok_or_else(|| RepositoryError::UnknownScan { key: key.clone() })
    }

    fn record_path(&self, stem: &str) -> PathBuf {
        self.dir.join(record_filename(stem))
    }

    fn staging_path(&self, stem: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{STAGING_EXTENSION}", record_filename(stem)))
    }

    /// Encode and write `scan` to its staging file.
    fn stage(&self, scan: &Scan) -> Result<PathBuf> {
        let bytes = record::encode(scan)?;
        let staged = self.staging_path(&scan.filename());
        fs::write(&staged, &bytes).map_err(|e| RepositoryError::from_io(&staged, e))?;
        debug!("Staged {} ({} bytes)", staged.display(), bytes.len());
        Ok(staged)
    }

    /// Rename a staged file over the record of `scan`.
    fn commit(&self, staged: &Path, scan: &Scan) -> Result<()> {
        let path = self.record_path(&scan.filename());
        fs::rename(staged, &path).map_err(|e| {
            discard_staged(staged);
            RepositoryError::from_io(&path, e)
        })
    }

    fn save(&self, scan: &Scan) -> Result<()> {
        let staged = self.stage(scan)?;
        self.commit(&staged, scan)
    }

    fn remove_record(&self, stem: &str) -> Result<()> {
        let path = self.record_path(stem);
        fs::remove_file(&path).map_err(|e| RepositoryError::from_io(&path, e))
    }
}

fn record_filename(stem: &str) -> String {
    format!("{stem}.{RECORD_EXTENSION}")
}

fn read_record(path: &Path) -> Result<Scan> {
    let bytes = fs::read(path).map_err(|e| RepositoryError::from_io(path, e))?;
    record::decode(path, &bytes)
}

fn discard_staged(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        debug!("Cannot remove staging file {}: {err}", path.display());
    }
}

fn ensure_folders(scan: &Scan, folders: &[PathBuf]) -> Result<()> {
    match folders.iter().find(|path| !scan.contains_folder(path)) {
        Some(missing) => Err(RepositoryError::FolderNotInScan {
            key: scan.key(),
            path: missing.clone(),
        }),
        None => Ok(()),
    }
}
