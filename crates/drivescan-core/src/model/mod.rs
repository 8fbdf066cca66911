/// Data model: folders, scans, and size formatting.
pub mod folder;
pub mod scan;
pub mod size;

pub use folder::{manifest_size, FileManifest, Folder, FolderState};
pub use scan::{compute_total_size, derive_filename, Scan, ScanKey, UpdateMark};
