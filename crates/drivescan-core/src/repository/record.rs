/// Versioned on-disk record schema for a scan.
///
/// A record is a JSON object with a `format` tag and the scan body:
///
/// ```json
/// { "format": 1,
///   "scan": { "name": "s1", "drive": "D:\\", "created": "2026-01-01T00:00:00Z",
///             "updated": null,
///             "folders": [ { "path": "D:\\a", "original_size": 100,
///                            "current_size": 100, "state": "unchanged",
///                            "files": { "x.bin": 100 } } ] } }
/// ```
///
/// Decoding reads the header first so a record from another format version is
/// reported as incompatible rather than as a parse failure of the body.
/// Totals are not stored; they are re-derived from the folders on load.
use super::error::{RepositoryError, Result};
use crate::model::{FileManifest, Folder, FolderState, Scan, UpdateMark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current record format. Bump on any incompatible schema change.
pub const RECORD_FORMAT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Header {
    format: Option<u32>,
}

#[derive(Serialize)]
struct RecordOut<'a> {
    format: u32,
    scan: ScanOut<'a>,
}

#[derive(Serialize)]
struct ScanOut<'a> {
    name: &'a str,
    drive: &'a Path,
    created: DateTime<Utc>,
    updated: Option<UpdateMark>,
    folders: Vec<FolderOut<'a>>,
}

#[derive(Serialize)]
struct FolderOut<'a> {
    path: &'a Path,
    original_size: u64,
    current_size: u64,
    state: FolderState,
    files: &'a FileManifest,
}

#[derive(Deserialize)]
struct RecordIn {
    scan: ScanIn,
}

#[derive(Deserialize)]
struct ScanIn {
    name: String,
    drive: PathBuf,
    created: DateTime<Utc>,
    #[serde(default)]
    updated: Option<UpdateMark>,
    folders: Vec<FolderIn>,
}

#[derive(Deserialize)]
struct FolderIn {
    path: PathBuf,
    original_size: u64,
    current_size: u64,
    state: FolderState,
    #[serde(default)]
    files: FileManifest,
}

/// Serialize `scan` into record bytes.
pub fn encode(scan: &Scan) -> Result<Vec<u8>> {
    let record = RecordOut {
        format: RECORD_FORMAT_VERSION,
        scan: ScanOut {
            name: scan.name(),
            drive: scan.drive(),
            created: scan.created(),
            updated: scan.updated(),
            folders: scan
                .folders()
                .map(|f| FolderOut {
                    path: f.path(),
                    original_size: f.original_size(),
                    current_size: f.current_size(),
                    state: f.state(),
                    files: f.files(),
                })
                .collect(),
        },
    };
    serde_json::to_vec(&record).map_err(|source| RepositoryError::Encode {
        key: scan.key(),
        source,
    })
}

/// Deserialize record bytes read from `path`.
pub fn decode(path: &Path, bytes: &[u8]) -> Result<Scan> {
    let corrupt = |source| RepositoryError::CorruptRecord {
        path: path.to_path_buf(),
        source,
    };

    let header: Header = serde_json::from_slice(bytes).map_err(corrupt)?;
    if header.format != Some(RECORD_FORMAT_VERSION) {
        return Err(RepositoryError::IncompatibleRecord {
            path: path.to_path_buf(),
            found: header.format,
            expected: RECORD_FORMAT_VERSION,
        });
    }

    let record: RecordIn = serde_json::from_slice(bytes).map_err(corrupt)?;
    let ScanIn {
        name,
        drive,
        created,
        updated,
        folders,
    } = record.scan;
    let folders = folders
        .into_iter()
        .map(|f| Folder::restore(f.path, f.original_size, f.current_size, f.state, f.files))
        .collect();
    Ok(Scan::restore(name, drive, created, folders, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ErrorKind;
    use compact_str::CompactString;

    fn sample() -> Scan {
        let mut files = FileManifest::new();
        files.insert(CompactString::new("x.bin"), 100);
        files.insert(CompactString::new("y.bin"), 20);
        let mut grown = Folder::measured("/d/a", FileManifest::new());
        grown.recompute(Some(files));
        let mut scan = Scan::new("weekly", "/d", [grown, Folder::measured("/d/b", FileManifest::new())]);
        scan.mark_updated(Utc::now());
        scan
    }

    #[test]
    fn record_reproduces_full_state() {
        let scan = sample();
        let bytes = encode(&scan).unwrap();
        let back = decode(Path::new("r.scan"), &bytes).unwrap();

        assert_eq!(back, scan);
        assert_eq!(back.created(), scan.created());
        assert_eq!(back.updated(), scan.updated());
        assert_eq!(back.size(), scan.size());
        for (a, b) in back.folders().zip(scan.folders()) {
            assert_eq!(a.path(), b.path());
            assert_eq!(a.state(), b.state());
            assert_eq!(a.original_size(), b.original_size());
            assert_eq!(a.current_size(), b.current_size());
            assert_eq!(a.files(), b.files());
        }
    }

    #[test]
    fn other_format_version_is_incompatible() {
        let raw = br#"{"format": 7, "scan": {}}"#;
        let err = decode(Path::new("r.scan"), raw).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::IncompatibleRecord { found: Some(7), .. }
        ));
    }

    #[test]
    fn missing_header_is_incompatible() {
        let err = decode(Path::new("r.scan"), br#"{"name": "old"}"#).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::IncompatibleRecord { found: None, .. }
        ));
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = decode(Path::new("r.scan"), b"\xac\xed\x00\x05sr").unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptRecord { .. }));
        assert_eq!(err.kind(), ErrorKind::CorruptOrIncompatibleRecord);
    }

    #[test]
    fn truncated_body_is_corrupt() {
        let bytes = encode(&sample()).unwrap();
        let err = decode(Path::new("r.scan"), &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptRecord { .. }));
    }
}
