/// Platform-specific functionality: drive enumeration.
pub mod drives;

pub use drives::{drive_containing, enumerate_drives, DriveInfo, DriveKind};
