/// Command-line arguments.
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "drivescan",
    version,
    about = "Record the folder sizes of a drive as named scans and track how they change"
)]
pub struct Cli {
    /// History folder holding the scan records [default: ./history, or $DRIVESCAN_HISTORY]
    #[arg(long, global = true, value_name = "DIR")]
    pub history: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::WARN;
        }
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Drives are stored by absolute path, so relative arguments are resolved
/// against the working directory here.
fn drive_path(arg: &str) -> Result<PathBuf, String> {
    std::path::absolute(arg).map_err(|e| format!("cannot resolve drive {arg:?}: {e}"))
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List the local drives
    Drives,

    /// List scans, grouped by drive
    List {
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Show the folders of a scan
    Show {
        scan: String,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Scan a drive, recording every folder no other scan of it owns yet
    Scan {
        name: String,
        /// Drive root [default: the drive holding the working directory]
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Re-measure the folders of a scan and classify their changes
    Update {
        scan: String,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Rename a scan
    Rename {
        scan: String,
        new_name: String,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Delete scans
    Delete {
        #[arg(required = true)]
        scans: Vec<String>,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Delete every scan of a drive
    DeleteAll {
        #[arg(long, value_parser = drive_path)]
        drive: PathBuf,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Merge scans into another scan of the same drive
    Merge {
        into: String,
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Remove folders from a scan
    RemoveFolders {
        scan: String,
        #[arg(required = true)]
        folders: Vec<PathBuf>,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Move folders from one scan to another
    Move {
        from: String,
        to: String,
        #[arg(required = true)]
        folders: Vec<PathBuf>,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Move folders from a scan into a new scan
    MoveNew {
        from: String,
        new_name: String,
        #[arg(required = true)]
        folders: Vec<PathBuf>,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// Write the folders of a scan to a CSV file
    Export {
        scan: String,
        output: PathBuf,
        #[arg(long, value_parser = drive_path)]
        drive: Option<PathBuf>,
    },

    /// List records that fail to load and optionally delete them
    PurgeBroken {
        /// Delete the broken records
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        let cli = Cli::try_parse_from(["drivescan", "-vv", "drives"]).unwrap();
        assert_eq!(cli.log_level(), Level::TRACE);
        let cli = Cli::try_parse_from(["drivescan", "drives", "-q"]).unwrap();
        assert_eq!(cli.log_level(), Level::WARN);
        assert!(Cli::try_parse_from(["drivescan", "-q", "-v", "drives"]).is_err());
    }

    #[test]
    fn merge_needs_a_source() {
        assert!(Cli::try_parse_from(["drivescan", "merge", "s1"]).is_err());
        let cli = Cli::try_parse_from(["drivescan", "merge", "s1", "s2", "s3"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Merge {
                into: "s1".into(),
                sources: vec!["s2".into(), "s3".into()],
                drive: None,
            }
        );
    }

    #[test]
    fn relative_drive_is_made_absolute() {
        let cli = Cli::try_parse_from(["drivescan", "scan", "s1", "--drive", "."]).unwrap();
        let Command::Scan { drive: Some(drive), .. } = cli.command else {
            panic!("expected a scan command with a drive");
        };
        assert!(drive.is_absolute());
        assert_eq!(drive, std::env::current_dir().unwrap());
    }

    #[test]
    fn history_flag_is_global() {
        let cli =
            Cli::try_parse_from(["drivescan", "list", "--history", "/tmp/h"]).unwrap();
        assert_eq!(cli.history, Some(PathBuf::from("/tmp/h")));
    }
}
