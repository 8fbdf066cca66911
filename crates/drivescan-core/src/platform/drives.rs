/// Drive enumeration.
///
/// On Windows the logical drives come from the Win32 volume API, with label,
/// filesystem and capacity. Elsewhere the locally mounted block devices are
/// read from `/proc/self/mounts`; when nothing usable is found the filesystem
/// root `/` is the only drive.
use std::path::{Path, PathBuf};

/// Information about a single drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    /// Root path scans of this drive start from, e.g. `C:\` or `/mnt/data`.
    pub path: PathBuf,
    pub kind: DriveKind,
    /// Volume label; empty when unknown.
    pub label: String,
    /// Filesystem name, e.g. `NTFS` or `ext4`.
    pub filesystem: String,
    /// Capacity in bytes, when the platform reports it.
    pub total_bytes: Option<u64>,
    pub free_bytes: Option<u64>,
}

impl DriveInfo {
    pub fn used_bytes(&self) -> Option<u64> {
        Some(self.total_bytes?.saturating_sub(self.free_bytes?))
    }

    /// Usage percentage (0.0 to 100.0).
    pub fn usage_percent(&self) -> Option<f32> {
        let total = self.total_bytes.filter(|&t| t > 0)?;
        Some((self.used_bytes()? as f64 / total as f64 * 100.0) as f32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveKind {
    Fixed,
    Removable,
    CdRom,
    Unknown,
}

impl DriveKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Removable => "Removable",
            Self::CdRom => "CD-ROM",
            Self::Unknown => "Unknown",
        }
    }
}

/// Enumerate the local drives. Network drives are never listed.
pub fn enumerate_drives() -> Vec<DriveInfo> {
    let drives = sys::enumerate();
    if drives.is_empty() {
        tracing::debug!("No drives reported by the platform; falling back to /");
        return vec![fallback_root()];
    }
    drives
}

/// The drive whose root is the longest prefix of `path`.
pub fn drive_containing<'a>(path: &Path, drives: &'a [DriveInfo]) -> Option<&'a DriveInfo> {
    drives
        .iter()
        .filter(|drive| path.starts_with(&drive.path))
        .max_by_key(|drive| drive.path.components().count())
}

fn fallback_root() -> DriveInfo {
    DriveInfo {
        path: PathBuf::from("/"),
        kind: DriveKind::Unknown,
        label: String::new(),
        filesystem: String::new(),
        total_bytes: None,
        free_bytes: None,
    }
}

#[cfg(windows)]
mod sys {
    use super::{DriveInfo, DriveKind};
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use std::path::PathBuf;
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{
        GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDriveStringsW, GetVolumeInformationW,
    };

    const DRIVE_REMOVABLE: u32 = 2;
    const DRIVE_FIXED: u32 = 3;
    const DRIVE_REMOTE: u32 = 4;
    const DRIVE_CDROM: u32 = 5;

    pub(super) fn enumerate() -> Vec<DriveInfo> {
        let mut buffer = [0u16; 256];
        let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) } as usize;
        if len == 0 || len > buffer.len() {
            tracing::warn!("GetLogicalDriveStringsW failed (returned {len})");
            return Vec::new();
        }

        let roots = OsString::from_wide(&buffer[..len]);
        roots
            .to_string_lossy()
            .split('\0')
            .filter(|root| !root.is_empty())
            .filter_map(describe)
            .collect()
    }

    fn describe(root: &str) -> Option<DriveInfo> {
        let wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0)).collect();
        let root_ptr = PCWSTR(wide.as_ptr());

        let kind = match unsafe { GetDriveTypeW(root_ptr) } {
            DRIVE_REMOTE => return None,
            DRIVE_FIXED => DriveKind::Fixed,
            DRIVE_REMOVABLE => DriveKind::Removable,
            DRIVE_CDROM => DriveKind::CdRom,
            _ => DriveKind::Unknown,
        };

        let mut label_buf = [0u16; 256];
        let mut fs_buf = [0u16; 256];
        let has_volume_info = unsafe {
            GetVolumeInformationW(
                root_ptr,
                Some(&mut label_buf),
                None,
                None,
                None,
                Some(&mut fs_buf),
            )
            .is_ok()
        };
        let (label, filesystem) = if has_volume_info {
            (wide_to_string(&label_buf), wide_to_string(&fs_buf))
        } else {
            (String::new(), String::new())
        };

        let mut free_caller = 0u64;
        let mut total = 0u64;
        let has_space = unsafe {
            GetDiskFreeSpaceExW(
                root_ptr,
                Some(&mut free_caller as *mut u64),
                Some(&mut total as *mut u64),
                None,
            )
            .is_ok()
        };

        Some(DriveInfo {
            path: PathBuf::from(root),
            kind,
            label,
            filesystem,
            total_bytes: has_space.then_some(total),
            free_bytes: has_space.then_some(free_caller),
        })
    }

    fn wide_to_string(buf: &[u16]) -> String {
        let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..end])
    }
}

#[cfg(not(windows))]
mod sys {
    use super::{DriveInfo, DriveKind};
    use std::collections::HashSet;
    use std::path::PathBuf;

    const MOUNTS_FILE: &str = "/proc/self/mounts";

    pub(super) fn enumerate() -> Vec<DriveInfo> {
        match std::fs::read_to_string(MOUNTS_FILE) {
            Ok(table) => parse_mounts(&table),
            Err(err) => {
                tracing::debug!("Cannot read {MOUNTS_FILE}: {err}");
                Vec::new()
            }
        }
    }

    /// Block-device mounts from a `mounts` table, first occurrence of each
    /// mount point wins.
    pub(super) fn parse_mounts(table: &str) -> Vec<DriveInfo> {
        let mut seen = HashSet::new();
        let mut drives = Vec::new();
        for line in table.lines() {
            let mut fields = line.split_whitespace();
            let (Some(device), Some(mount_point), Some(filesystem)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if !device.starts_with("/dev/") || device.starts_with("/dev/loop") {
                continue;
            }
            let path = PathBuf::from(unescape(mount_point));
            if !seen.insert(path.clone()) {
                continue;
            }
            drives.push(DriveInfo {
                path,
                kind: DriveKind::Fixed,
                label: unescape(device.trim_start_matches("/dev/")),
                filesystem: filesystem.to_owned(),
                total_bytes: None,
                free_bytes: None,
            });
        }
        drives
    }

    /// Undo the octal escapes (`\040` for space and friends) used in the
    /// mounts table.
    fn unescape(field: &str) -> String {
        let bytes = field.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\\' {
                let escaped = field
                    .get(i + 1..i + 4)
                    .filter(|digits| digits.bytes().all(|b| (b'0'..=b'7').contains(&b)))
                    .and_then(|digits| u8::from_str_radix(digits, 8).ok());
                if let Some(byte) = escaped {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
            out.push(bytes[i]);
            i += 1;
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid 0 0
/dev/sda2 / ext4 rw,relatime 0 0
/dev/sdb1 /mnt/my\\040data xfs rw 0 0
/dev/loop0 /snap/core squashfs ro 0 0
/dev/sda2 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw 0 0
";

        #[test]
        fn keeps_block_devices_only() {
            let drives = parse_mounts(TABLE);
            let paths: Vec<&str> = drives.iter().filter_map(|d| d.path.to_str()).collect();
            assert_eq!(paths, ["/", "/mnt/my data"]);
            assert_eq!(drives[1].filesystem, "xfs");
            assert_eq!(drives[1].label, "sdb1");
        }

        #[test]
        fn malformed_escape_is_kept_verbatim() {
            assert_eq!(unescape("a\\9zz"), "a\\9zz");
            assert_eq!(unescape("tail\\04"), "tail\\04");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(path: &str) -> DriveInfo {
        DriveInfo {
            path: PathBuf::from(path),
            ..fallback_root()
        }
    }

    #[test]
    fn deepest_mount_contains_path() {
        let drives = [drive("/"), drive("/mnt/data"), drive("/mnt")];
        let found = drive_containing(Path::new("/mnt/data/photos"), &drives).unwrap();
        assert_eq!(found.path, PathBuf::from("/mnt/data"));
    }

    #[test]
    fn usage_needs_capacity() {
        let mut info = drive("/");
        assert_eq!(info.usage_percent(), None);
        info.total_bytes = Some(200);
        info.free_bytes = Some(50);
        assert_eq!(info.used_bytes(), Some(150));
        assert_eq!(info.usage_percent(), Some(75.0));
    }

    #[test]
    fn enumeration_is_never_empty() {
        assert!(!enumerate_drives().is_empty());
    }
}
