/// CSV export of a scan: one row per folder, in path order.
use crate::model::Scan;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct FolderRow<'a> {
    path: &'a str,
    state: &'static str,
    original_size: u64,
    current_size: u64,
    change: i64,
    files: usize,
}

/// Write the folders of `scan` as CSV with a header row.
pub fn write_scan_csv<W: Write>(scan: &Scan, out: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    for folder in scan.folders() {
        let path = folder.path().to_string_lossy();
        writer.serialize(FolderRow {
            path: &path,
            state: folder.state().label(),
            original_size: folder.original_size(),
            current_size: folder.current_size(),
            change: folder.size_change(),
            files: folder.file_count(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Export `scan` to a CSV file at `path`, replacing any existing file.
pub fn export_scan_csv(scan: &Scan, path: &Path) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path)?;
    write_scan_csv(scan, file)?;
    tracing::info!("Exported {} to {}", scan.key(), path.display());
    Ok(())
}
