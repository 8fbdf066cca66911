/// In-memory index of scans grouped by drive.
///
/// This is the only structure a front end consults. Per drive, scans are kept
/// in creation order (ties broken by name). The repository is the only
/// writer, and it only inserts scans whose record has been written.
use crate::model::{Scan, ScanKey};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Default)]
pub struct Catalog {
    drives: BTreeMap<PathBuf, Vec<Scan>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `scan` in creation order. A scan whose key is already present
    /// is rejected and `false` is returned.
    pub(crate) fn insert(&mut self, scan: Scan) -> bool {
        let scans = self.drives.entry(scan.drive().to_path_buf()).or_default();
        if scans.iter().any(|s| s.name() == scan.name()) {
            warn!("Catalog already holds {}; ignoring duplicate", scan.key());
            return false;
        }
        let pos = scans.partition_point(|s| {
            (s.created(), s.name()) <= (scan.created(), scan.name())
        });
        scans.insert(pos, scan);
        true
    }

    pub(crate) fn remove(&mut self, key: &ScanKey) -> Option<Scan> {
        let scans = self.drives.get_mut(&key.drive)?;
        let pos = scans.iter().position(|s| s.name() == key.name)?;
        let removed = scans.remove(pos);
        if scans.is_empty() {
            self.drives.remove(&key.drive);
        }
        Some(removed)
    }

    /// Swap the entry for `old` with `new`. Removal happens first so a scan
    /// keeping its key can replace itself.
    pub(crate) fn replace(&mut self, old: &ScanKey, new: Scan) {
        self.remove(old);
        self.insert(new);
    }

    pub fn get(&self, key: &ScanKey) -> Option<&Scan> {
        self.drives
            .get(&key.drive)?
            .iter()
            .find(|s| s.name() == key.name)
    }

    pub fn contains(&self, key: &ScanKey) -> bool {
        self.get(key).is_some()
    }

    /// Drives that currently have at least one scan, in path order.
    pub fn drives(&self) -> impl Iterator<Item = &Path> + '_ {
        self.drives.keys().map(PathBuf::as_path)
    }

    /// Scans of `drive` in creation order.
    pub fn drive_scans(&self, drive: &Path) -> &[Scan] {
        self.drives.get(drive).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every folder path recorded by any scan of `drive`.
    pub fn drive_folders(&self, drive: &Path) -> HashSet<PathBuf> {
        self.drive_scans(drive)
            .iter()
            .flat_map(|scan| scan.folders().map(|f| f.path().to_path_buf()))
            .collect()
    }

    pub fn is_drive_empty(&self, drive: &Path) -> bool {
        self.drive_scans(drive).is_empty()
    }

    /// Scans named `name`, optionally restricted to one drive.
    pub fn find_by_name<'a>(
        &'a self,
        name: &'a str,
        drive: Option<&'a Path>,
    ) -> impl Iterator<Item = &'a Scan> + 'a {
        self.iter()
            .filter(move |s| s.name() == name && drive.map_or(true, |d| s.drive() == d))
    }

    /// All scans, grouped by drive.
    pub fn iter(&self) -> impl Iterator<Item = &Scan> + '_ {
        self.drives.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.drives.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileManifest, Folder};
    use chrono::{TimeZone, Utc};

    fn scan_at(name: &str, drive: &str, secs: i64, folder: &str) -> Scan {
        Scan::with_date(
            name,
            drive,
            [Folder::measured(folder, FileManifest::new())],
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[test]
    fn scans_are_ordered_by_creation_date() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(scan_at("late", "C:\\", 300, "/c")));
        assert!(catalog.insert(scan_at("early", "C:\\", 100, "/a")));
        assert!(catalog.insert(scan_at("middle", "C:\\", 200, "/b")));

        let names: Vec<&str> = catalog
            .drive_scans(Path::new("C:\\"))
            .iter()
            .map(Scan::name)
            .collect();
        assert_eq!(names, ["early", "middle", "late"]);
    }

    #[test]
    fn same_date_scans_are_both_kept() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(scan_at("b", "C:\\", 100, "/b")));
        assert!(catalog.insert(scan_at("a", "C:\\", 100, "/a")));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.drive_scans(Path::new("C:\\"))[0].name(), "a");
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(scan_at("s", "C:\\", 100, "/a")));
        assert!(!catalog.insert(scan_at("s", "C:\\", 500, "/b")));
        assert_eq!(catalog.len(), 1);
        let kept = catalog.get(&ScanKey::new("C:\\", "s")).unwrap();
        assert!(kept.contains_folder(Path::new("/a")));
    }

    #[test]
    fn drive_folders_span_all_scans_of_a_drive() {
        let mut catalog = Catalog::new();
        catalog.insert(scan_at("one", "C:\\", 1, "/a"));
        catalog.insert(scan_at("two", "C:\\", 2, "/b"));
        catalog.insert(scan_at("other", "D:\\", 3, "/z"));

        let folders = catalog.drive_folders(Path::new("C:\\"));
        assert_eq!(folders.len(), 2);
        assert!(folders.contains(Path::new("/a")));
        assert!(!folders.contains(Path::new("/z")));
    }

    #[test]
    fn removing_last_scan_empties_drive() {
        let mut catalog = Catalog::new();
        catalog.insert(scan_at("only", "D:\\", 1, "/a"));
        assert!(!catalog.is_drive_empty(Path::new("D:\\")));

        let removed = catalog.remove(&ScanKey::new("D:\\", "only"));
        assert!(removed.is_some());
        assert!(catalog.is_drive_empty(Path::new("D:\\")));
        assert_eq!(catalog.drives().count(), 0);
    }

    #[test]
    fn replace_swaps_identity() {
        let mut catalog = Catalog::new();
        let old = scan_at("old", "C:\\", 1, "/a");
        let renamed = old.renamed("new");
        catalog.insert(old);
        catalog.replace(&ScanKey::new("C:\\", "old"), renamed);

        assert!(catalog.get(&ScanKey::new("C:\\", "old")).is_none());
        assert!(catalog.get(&ScanKey::new("C:\\", "new")).is_some());
    }
}
