//! Disk space budgeting for cache namespaces

use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

pub const MIN_DISK_CACHE_SIZE: u64 = 30 * 1024 * 1024;
pub const MAX_DISK_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Share of the available space a namespace may claim, as a divisor
const AVAILABLE_SPACE_DIVISOR: u64 = 50;

/// Reports how much free space backs a path
pub trait DiskSpace: Send + Sync {
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Queries the mounted filesystems of the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiskSpace;

impl DiskSpace for SystemDiskSpace {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let path = existing_ancestor(path)?;
        let disks = Disks::new_with_refreshed_list();

        // The disk mounted deepest along the path is the one holding it
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .map(|disk| disk.available_space())
    }
}

/// A fixed answer, for tests and hosts without a usable space query
#[derive(Debug, Clone, Copy)]
pub struct FixedDiskSpace(pub u64);

impl DiskSpace for FixedDiskSpace {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        Some(self.0)
    }
}

/// Byte budget for a cache in `directory`: 2% of the available space,
/// kept between [`MIN_DISK_CACHE_SIZE`] and [`MAX_DISK_CACHE_SIZE`]
pub fn disk_cache_size_bytes(space: &dyn DiskSpace, directory: &Path) -> u64 {
    let size = match space.available_bytes(directory) {
        Some(available) => available / AVAILABLE_SPACE_DIVISOR,
        None => {
            debug!(directory = ?directory, "Available disk space unknown, using minimum cache size");
            MIN_DISK_CACHE_SIZE
        }
    };
    size.clamp(MIN_DISK_CACHE_SIZE, MAX_DISK_CACHE_SIZE)
}

/// The cache directory may not exist yet; measure the closest parent that does
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|ancestor| ancestor.exists())
        .and_then(|ancestor| ancestor.canonicalize().ok())
}
