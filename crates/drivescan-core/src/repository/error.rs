/// Errors surfaced by repository operations.
///
/// Every persistence failure is returned as a value; nothing panics past the
/// repository boundary. [`RepositoryError::kind`] folds the variants into the
/// coarse categories a front end reacts to.
use crate::model::ScanKey;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("scan record {} not found", path.display())]
    RecordNotFound { path: PathBuf },

    #[error("access denied to {}: {source}", path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scan record {} is corrupt: {source}", path.display())]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("scan record {} has format {found:?}, expected {expected}", path.display())]
    IncompatibleRecord {
        path: PathBuf,
        found: Option<u32>,
        expected: u32,
    },

    #[error("scan record {} holds {key}, whose record would be {expected}", path.display())]
    MisplacedRecord {
        path: PathBuf,
        key: ScanKey,
        expected: String,
    },

    #[error("a scan {key} already exists")]
    DuplicateName { key: ScanKey },

    #[error("no scan {key}")]
    UnknownScan { key: ScanKey },

    #[error("scan {key} has no folders")]
    EmptyScan { key: ScanKey },

    #[error("scans {a} and {b} belong to different drives")]
    CrossDrive { a: ScanKey, b: ScanKey },

    #[error("scan {key} does not contain folder {}", path.display())]
    FolderNotInScan { key: ScanKey, path: PathBuf },

    #[error("folders cannot be moved from {key} into itself")]
    SameScan { key: ScanKey },

    #[error("{name:?} is not a removable record file")]
    InvalidRecordName { name: String },

    #[error("cannot encode scan {key}: {source}")]
    Encode {
        key: ScanKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The record file is missing (e.g. deleted externally).
    RecordNotFound,
    /// The record or the history folder cannot be read or written.
    AccessDenied,
    /// The record could not be decoded, or was written by another format version.
    CorruptOrIncompatibleRecord,
    /// A scan with the same drive and name already exists.
    DuplicateName,
    /// The request itself is invalid (unknown scan, empty result, wrong drive).
    InvalidRequest,
    /// Any other I/O failure.
    Io,
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::CorruptRecord { .. }
            | Self::IncompatibleRecord { .. }
            | Self::MisplacedRecord { .. } => ErrorKind::CorruptOrIncompatibleRecord,
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::UnknownScan { .. }
            | Self::EmptyScan { .. }
            | Self::CrossDrive { .. }
            | Self::FolderNotInScan { .. }
            | Self::SameScan { .. }
            | Self::InvalidRecordName { .. }
            | Self::Encode { .. } => ErrorKind::InvalidRequest,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Classify an I/O failure on `path`.
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::RecordNotFound { path },
            io::ErrorKind::PermissionDenied => Self::AccessDenied { path, source },
            _ => Self::Io { path, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let path = Path::new("/history/c-x.scan");
        let missing = RepositoryError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        let denied =
            RepositoryError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        let other = RepositoryError::from_io(path, io::Error::other("disk on fire"));

        assert_eq!(missing.kind(), ErrorKind::RecordNotFound);
        assert_eq!(denied.kind(), ErrorKind::AccessDenied);
        assert_eq!(other.kind(), ErrorKind::Io);
    }

    #[test]
    fn incompatible_and_corrupt_share_a_kind() {
        let incompatible = RepositoryError::IncompatibleRecord {
            path: PathBuf::from("x.scan"),
            found: Some(99),
            expected: 1,
        };
        let corrupt = RepositoryError::CorruptRecord {
            path: PathBuf::from("x.scan"),
            source: serde_json::from_str::<u32>("{").unwrap_err(),
        };
        assert_eq!(incompatible.kind(), corrupt.kind());
        assert_eq!(incompatible.kind(), ErrorKind::CorruptOrIncompatibleRecord);
    }
}
