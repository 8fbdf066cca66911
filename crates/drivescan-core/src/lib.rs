/// DriveScan Core: folder-size snapshots of a drive and their history.
///
/// This crate contains all business logic with zero UI dependencies. A front
/// end enumerates drives, starts scans and updates on a background thread,
/// and commits the results through the [`repository::Repository`].
///
/// # Modules
///
/// - [`model`]: folders, scans, and size formatting.
/// - [`scanner`]: the folder crawler with cancellation and progress reporting.
/// - [`repository`]: persisted scan records and the per-drive catalog.
/// - [`config`]: history folder location.
/// - [`platform`]: drive enumeration.
/// - [`export`]: CSV export of a scan.
pub mod config;
pub mod export;
pub mod model;
pub mod platform;
pub mod repository;
pub mod scanner;
