// BookForge - Audiobook Library Organizer
// Copyright (C) 2025 BookForge Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Read-only filesystem abstraction
//!
//! The planner and conflict detector never touch the disk directly; they ask
//! a [`FilesystemView`] for existence, directory listings, case sensitivity
//! and device identity. This keeps both components pure enough to test
//! against [`MemoryFilesystemView`] without a real tree.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Read-only view of the filesystem state a plan will run against
pub trait FilesystemView: Send + Sync {
    /// Whether a file or directory exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Entries of a directory; empty if missing or unreadable
    fn list_dir(&self, path: &Path) -> Vec<PathBuf>;

    /// Whether the target filesystem compares names case-insensitively.
    /// This is configuration, not a platform assumption.
    fn is_case_insensitive(&self) -> bool;

    /// Whether two paths resolve to the same storage volume. Paths that do
    /// not exist yet are judged by their nearest existing ancestor.
    fn same_device(&self, a: &Path, b: &Path) -> bool;
}

/// View backed by the real filesystem
#[derive(Debug, Clone)]
pub struct RealFilesystemView {
    case_insensitive: bool,
}

impl RealFilesystemView {
    pub fn new(case_insensitive: bool) -> Self {
        Self { case_insensitive }
    }
}

impl Default for RealFilesystemView {
    fn default() -> Self {
        // Default filesystems on these platforms are case-insensitive;
        // callers with unusual mounts should configure explicitly.
        Self::new(cfg!(any(target_os = "windows", target_os = "macos")))
    }
}

impl FilesystemView for RealFilesystemView {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(path) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    #[cfg(unix)]
    fn same_device(&self, a: &Path, b: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;

        fn device_of(path: &Path) -> Option<u64> {
            let mut current = Some(path);
            while let Some(p) = current {
                if let Ok(meta) = std::fs::metadata(p) {
                    return Some(meta.dev());
                }
                current = p.parent();
            }
            None
        }

        match (device_of(a), device_of(b)) {
            (Some(da), Some(db)) => da == db,
            _ => true,
        }
    }

    #[cfg(not(unix))]
    fn same_device(&self, a: &Path, b: &Path) -> bool {
        // Windows: different drives mean different volumes
        use std::path::Component;
        let prefix = |p: &Path| {
            p.components().next().and_then(|c| match c {
                Component::Prefix(pre) => Some(pre.as_os_str().to_os_string()),
                _ => None,
            })
        };
        match (prefix(a), prefix(b)) {
            (Some(pa), Some(pb)) => pa == pb,
            _ => true,
        }
    }
}

/// In-memory filesystem view for tests and simulations
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystemView {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
    case_insensitive: bool,
    /// Mount points mapped to a device id; longest prefix wins, default 0
    mounts: Vec<(PathBuf, u64)>,
}

impl MemoryFilesystemView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Register a file, creating all ancestor directories
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut parent = path.parent().map(Path::to_path_buf);
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.clone());
            parent = dir.parent().map(Path::to_path_buf);
        }
        self.files.insert(path);
    }

    pub fn add_dir(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut current = Some(path);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.clone());
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    /// Declare a mount point with a device id
    pub fn add_mount(&mut self, path: impl Into<PathBuf>, device: u64) {
        self.mounts.push((path.into(), device));
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        if self.case_insensitive {
            PathBuf::from(path.to_string_lossy().to_lowercase())
        } else {
            path.to_path_buf()
        }
    }

    fn device_of(&self, path: &Path) -> u64 {
        self.mounts
            .iter()
            .filter(|(mount, _)| path.starts_with(mount))
            .max_by_key(|(mount, _)| mount.components().count())
            .map_or(0, |(_, dev)| *dev)
    }
}

impl FilesystemView for MemoryFilesystemView {
    fn exists(&self, path: &Path) -> bool {
        let needle = self.normalize(path);
        self.files.iter().any(|p| self.normalize(p) == needle)
            || self.dirs.iter().any(|p| self.normalize(p) == needle)
    }

    fn list_dir(&self, path: &Path) -> Vec<PathBuf> {
        self.files
            .iter()
            .chain(self.dirs.iter())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect()
    }

    fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    fn same_device(&self, a: &Path, b: &Path) -> bool {
        self.device_of(a) == self.device_of(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_view_tracks_ancestors() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/author/title/01.mp3");

        assert!(fs.exists(Path::new("/books/author/title/01.mp3")));
        assert!(fs.exists(Path::new("/books/author/title")));
        assert!(fs.exists(Path::new("/books")));
        assert!(!fs.exists(Path::new("/books/other")));
    }

    #[test]
    fn test_memory_view_case_insensitive() {
        let mut fs = MemoryFilesystemView::new().case_insensitive();
        fs.add_file("/books/Title.mp3");

        assert!(fs.exists(Path::new("/books/title.MP3")));
        assert!(fs.is_case_insensitive());
    }

    #[test]
    fn test_memory_view_list_dir() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/a/01.mp3");
        fs.add_file("/books/a/02.mp3");
        fs.add_file("/books/b/01.mp3");

        let mut entries = fs.list_dir(Path::new("/books/a"));
        entries.sort();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/books/a/01.mp3"),
                PathBuf::from("/books/a/02.mp3"),
            ]
        );
    }

    #[test]
    fn test_memory_view_devices() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_mount("/", 1);
        fs.add_mount("/mnt/usb", 2);

        assert!(fs.same_device(Path::new("/books/a"), Path::new("/books/b")));
        assert!(!fs.same_device(Path::new("/books/a"), Path::new("/mnt/usb/b")));
    }

    #[test]
    fn test_real_view_same_device_for_same_dir() {
        let fs = RealFilesystemView::new(false);
        let dir = std::env::temp_dir();
        assert!(fs.same_device(&dir.join("a"), &dir.join("b")));
    }
}
