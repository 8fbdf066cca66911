/// Command implementations: resolve names, call the core, print results.
use crate::cli::Command;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use drivescan_core::config::Settings;
use drivescan_core::export;
use drivescan_core::model::size::{format_change, format_count, format_size};
use drivescan_core::model::{FolderState, Scan, ScanKey};
use drivescan_core::platform::{self, DriveInfo};
use drivescan_core::repository::{FolderEdit, LoadFailure, Repository};
use drivescan_core::scanner::{self, ScanError, ScanProgress, TaskHandle};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed}] {pos} folders  {wide_msg:.dim}";
const TICK: Duration = Duration::from_millis(100);

pub fn run(command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Drives => {
            print_drives(&platform::enumerate_drives());
            Ok(())
        }
        Command::PurgeBroken { yes } => {
            let (repo, failures) = open(settings)?;
            purge_broken(&repo, &failures, yes)
        }
        other => {
            let (mut repo, failures) = open(settings)?;
            if !failures.is_empty() {
                warn!(
                    "{} scan records could not be loaded; see `drivescan purge-broken`",
                    failures.len()
                );
            }
            run_on(&mut repo, other)
        }
    }
}

fn open(settings: &Settings) -> Result<(Repository, Vec<LoadFailure>)> {
    let mut repo = Repository::open(settings).with_context(|| {
        format!(
            "cannot open history folder {}",
            settings.history_dir.display()
        )
    })?;
    let failures = repo.load().context("cannot load scan history")?;
    Ok((repo, failures))
}

fn run_on(repo: &mut Repository, command: Command) -> Result<()> {
    match command {
        Command::Drives | Command::PurgeBroken { .. } => Ok(()),
        Command::List { drive } => {
            list(repo, drive.as_deref());
            Ok(())
        }
        Command::Show { scan, drive } => {
            let key = find_scan(repo, &scan, drive.as_deref())?;
            if let Some(scan) = repo.catalog().get(&key) {
                print_scan(scan);
            }
            Ok(())
        }
        Command::Scan { name, drive } => scan(repo, name, drive),
        Command::Update { scan, drive } => update(repo, &scan, drive.as_deref()),
        Command::Rename {
            scan,
            new_name,
            drive,
        } => {
            let key = find_scan(repo, &scan, drive.as_deref())?;
            let renamed = repo
                .rename_scan(&key, &new_name)
                .with_context(|| format!("cannot rename {key}"))?;
            println!("Renamed {key} to \"{}\"", renamed.name());
            Ok(())
        }
        Command::Delete { scans, drive } => {
            let keys = scans
                .iter()
                .map(|name| find_scan(repo, name, drive.as_deref()))
                .collect::<Result<Vec<_>>>()?;
            for key in keys {
                repo.delete_scan(&key)
                    .with_context(|| format!("cannot delete {key}"))?;
                println!("Deleted {key}");
            }
            Ok(())
        }
        Command::DeleteAll { drive, yes } => {
            if !yes {
                bail!(
                    "refusing to delete every scan of {} without --yes",
                    drive.display()
                );
            }
            let total = repo.catalog().drive_scans(&drive).len();
            let failed = repo.delete_scans(&drive);
            for (key, err) in &failed {
                eprintln!("Could not delete {key}: {err}");
            }
            println!(
                "Deleted {} of {total} scans of {}",
                total - failed.len(),
                drive.display()
            );
            if failed.is_empty() {
                Ok(())
            } else {
                bail!("{} scans could not be deleted", failed.len())
            }
        }
        Command::Merge {
            into,
            sources,
            drive,
        } => {
            let into = find_scan(repo, &into, drive.as_deref())?;
            let sources = sources
                .iter()
                .map(|name| find_scan(repo, name, Some(into.drive.as_path())))
                .collect::<Result<Vec<_>>>()?;
            let outcome = repo
                .merge_scans(&sources, &into)
                .with_context(|| format!("cannot merge into {into}"))?;
            for (key, err) in &outcome.stale_sources {
                eprintln!("Merged {key}, but its record could not be deleted: {err}");
            }
            if let Some(merged) = repo.catalog().get(&outcome.merged) {
                println!(
                    "Merged into {}: {} folders, {}",
                    outcome.merged,
                    format_count(merged.folder_count() as u64),
                    format_size(merged.size())
                );
            }
            Ok(())
        }
        Command::RemoveFolders {
            scan,
            folders,
            drive,
        } => {
            let key = find_scan(repo, &scan, drive.as_deref())?;
            let edit = repo
                .delete_scan_folders(&key, &folders)
                .with_context(|| format!("cannot remove folders from {key}"))?;
            match edit {
                FolderEdit::Saved(key) => println!("Removed {} folders from {key}", folders.len()),
                FolderEdit::Deleted => println!("{key} had no folders left and was deleted"),
            }
            Ok(())
        }
        Command::Move {
            from,
            to,
            folders,
            drive,
        } => {
            let from = find_scan(repo, &from, drive.as_deref())?;
            let to = find_scan(repo, &to, Some(from.drive.as_path()))?;
            let moved = repo
                .move_scan_folders(&from, &to, &folders)
                .with_context(|| format!("cannot move folders from {from} to {to}"))?;
            report_move(&from, moved.from.is_none(), &moved.to, folders.len());
            Ok(())
        }
        Command::MoveNew {
            from,
            new_name,
            folders,
            drive,
        } => {
            let from = find_scan(repo, &from, drive.as_deref())?;
            let moved = repo
                .move_to_new_scan(&from, &new_name, &folders)
                .with_context(|| format!("cannot move folders from {from} to \"{new_name}\""))?;
            report_move(&from, moved.from.is_none(), &moved.to, folders.len());
            Ok(())
        }
        Command::Export {
            scan,
            output,
            drive,
        } => {
            let key = find_scan(repo, &scan, drive.as_deref())?;
            if let Some(scan) = repo.catalog().get(&key) {
                export::export_scan_csv(scan, &output)
                    .with_context(|| format!("cannot export {key} to {}", output.display()))?;
                println!("Exported {key} to {}", output.display());
            }
            Ok(())
        }
    }
}

fn scan(repo: &mut Repository, name: String, drive: Option<PathBuf>) -> Result<()> {
    let drive = match drive {
        Some(drive) => drive,
        None => default_drive()?,
    };
    if repo.exists_scan(&drive, &name) {
        bail!("a scan named \"{name}\" already exists on {}", drive.display());
    }

    let existing = repo.catalog().drive_folders(&drive);
    let task = scanner::start_scan(name.clone(), drive.clone(), existing)?;
    let Some(new_scan) = follow(task).with_context(|| format!("scan of {} failed", drive.display()))?
    else {
        println!(
            "No new folders on {}; every folder already belongs to a scan",
            drive.display()
        );
        return Ok(());
    };

    let stored = repo
        .add_scan(new_scan)
        .with_context(|| format!("cannot save scan \"{name}\""))?;
    println!(
        "Recorded {} folders, {} files, {} as {}",
        format_count(stored.folder_count() as u64),
        format_count(stored.file_count() as u64),
        format_size(stored.size()),
        stored.key()
    );
    Ok(())
}

fn update(repo: &mut Repository, name: &str, drive: Option<&Path>) -> Result<()> {
    let key = find_scan(repo, name, drive)?;
    let Some(current) = repo.catalog().get(&key) else {
        bail!("no scan {key}");
    };

    let task = scanner::start_update(current.clone())?;
    let refreshed = follow(task).with_context(|| format!("update of {key} failed"))?;
    let stored = repo
        .update_scan(refreshed)
        .with_context(|| format!("cannot save update of {key}"))?;

    let count = |state| stored.folders().filter(|f| f.state() == state).count();
    println!(
        "Updated {key}: {} increased, {} decreased, {} deleted, {} unchanged",
        count(FolderState::Increased),
        count(FolderState::Decreased),
        count(FolderState::Deleted),
        count(FolderState::Unchanged),
    );
    if let Some(mark) = stored.updated() {
        let change = i128::from(mark.size) - i128::from(stored.size());
        println!(
            "Size now {} (was {}, {})",
            format_size(mark.size),
            format_size(stored.size()),
            format_change(change.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
        );
    }
    Ok(())
}

fn purge_broken(repo: &Repository, failures: &[LoadFailure], yes: bool) -> Result<()> {
    if failures.is_empty() {
        println!("All scan records load cleanly");
        return Ok(());
    }
    for failure in failures {
        println!("{}: {}", failure.filename, failure.error);
    }
    if !yes {
        println!("Run again with --yes to delete these {} records", failures.len());
        return Ok(());
    }

    let names: Vec<&str> = failures.iter().map(|f| f.filename.as_str()).collect();
    let failed = repo.delete_record_files(names.as_slice());
    for (name, err) in &failed {
        eprintln!("Could not delete {name}: {err}");
    }
    println!("Deleted {} broken records", names.len() - failed.len());
    Ok(())
}

/// Resolve a scan name, optionally restricted to one drive.
fn find_scan(repo: &Repository, name: &str, drive: Option<&Path>) -> Result<ScanKey> {
    let matches: Vec<ScanKey> = repo
        .catalog()
        .find_by_name(name, drive)
        .map(Scan::key)
        .collect();
    match matches.as_slice() {
        [] => match drive {
            Some(drive) => bail!("no scan named \"{name}\" on {}", drive.display()),
            None => bail!("no scan named \"{name}\""),
        },
        [key] => Ok(key.clone()),
        _ => bail!("\"{name}\" exists on several drives; pick one with --drive"),
    }
}

/// The drive holding the working directory.
fn default_drive() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("cannot read the working directory")?;
    let drives = platform::enumerate_drives();
    Ok(platform::drive_containing(&cwd, &drives)
        .map(|d| d.path.clone())
        .unwrap_or_else(|| PathBuf::from("/")))
}

/// Relay progress to a spinner until the task finishes, then return its result.
fn follow<T>(task: TaskHandle<T>) -> Result<T, ScanError> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(TICK);

    let mut unreadable = 0u64;
    loop {
        match task.progress_rx.recv_timeout(TICK) {
            Ok(ScanProgress::Visiting {
                current_path,
                folders_done,
            }) => {
                spinner.set_position(folders_done);
                spinner.set_message(current_path);
            }
            Ok(ScanProgress::Unreadable { .. }) => unreadable += 1,
            Err(err) if err.is_disconnected() => break,
            Err(_) if task.is_finished() => break,
            Err(_) => {}
        }
    }
    spinner.finish_and_clear();

    if unreadable > 0 {
        eprintln!("{unreadable} folders could not be read");
    }
    task.wait()
}

fn report_move(from: &ScanKey, from_deleted: bool, to: &ScanKey, count: usize) {
    println!("Moved {count} folders from {from} to {to}");
    if from_deleted {
        println!("{from} had no folders left and was deleted");
    }
}

fn local_time(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn list(repo: &Repository, drive: Option<&Path>) {
    let catalog = repo.catalog();
    let drives: Vec<&Path> = match drive {
        Some(drive) => vec![drive],
        None => catalog.drives().collect(),
    };
    if drives.iter().all(|d| catalog.is_drive_empty(d)) {
        println!("No scans");
        return;
    }

    for drive in drives {
        println!("{}", drive.display());
        for scan in catalog.drive_scans(drive) {
            let updated = scan
                .updated()
                .map(|mark| format!("updated {} ({})", local_time(mark.date), format_size(mark.size)))
                .unwrap_or_default();
            println!(
                "  {:<24} {}  {:>10}  {:>8} folders  {updated}",
                scan.name(),
                local_time(scan.created()),
                format_size(scan.size()),
                format_count(scan.folder_count() as u64),
            );
        }
    }
}

fn print_scan(scan: &Scan) {
    println!("{}", scan.key());
    println!("  created  {}", local_time(scan.created()));
    println!(
        "  size     {} in {} folders, {} files",
        format_size(scan.size()),
        format_count(scan.folder_count() as u64),
        format_count(scan.file_count() as u64)
    );
    if let Some(mark) = scan.updated() {
        println!(
            "  updated  {} ({})",
            local_time(mark.date),
            format_size(mark.size)
        );
    }
    println!();
    println!(
        "  {:<10} {:>10} {:>10} {:>10} {:>7}  path",
        "state", "original", "current", "change", "files"
    );
    for folder in scan.folders() {
        println!(
            "  {:<10} {:>10} {:>10} {:>10} {:>7}  {}",
            folder.state().label(),
            format_size(folder.original_size()),
            format_size(folder.current_size()),
            format_change(folder.size_change()),
            folder.file_count(),
            folder.path().display()
        );
    }
}

fn print_drives(drives: &[DriveInfo]) {
    for drive in drives {
        let capacity = match (drive.total_bytes, drive.free_bytes) {
            (Some(total), Some(free)) => {
                format!("{} free of {}", format_size(free), format_size(total))
            }
            _ => String::new(),
        };
        println!(
            "{:<16} {:<10} {:<8} {:<16} {capacity}",
            drive.path.display(),
            drive.kind.label(),
            drive.filesystem,
            drive.label
        );
    }
}
