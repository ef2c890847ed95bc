use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::FileModificationInfo;

#[derive(Debug, Clone, Copy)]
struct FileState {
    exists: bool,
    is_directory: bool,
    last_modified: Option<SystemTime>,
}

impl FileState {
    fn stat(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(metadata) => Self {
                exists: true,
                is_directory: metadata.is_dir(),
                last_modified: metadata.modified().ok(),
            },
            Err(_) => Self {
                exists: false,
                is_directory: false,
                last_modified: None,
            },
        }
    }
}

/// Cached state of one path.
///
/// The filesystem is only consulted again once the generation of the
/// enclosing watched subtree differs from the one recorded at the last real
/// check, so repeated queries during a build cost an atomic load.
#[derive(Debug)]
pub struct FileInfo {
    path: PathBuf,
    info: FileModificationInfo,
    snapshot: Mutex<Option<(u64, FileState)>>,
}

impl FileInfo {
    /// Creates a file info for `path` guarded by `info`.
    pub fn new(path: PathBuf, info: FileModificationInfo) -> Self {
        Self {
            path,
            info,
            snapshot: Mutex::new(None),
        }
    }

    /// The described path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The generation info guarding this path.
    pub fn modification_info(&self) -> &FileModificationInfo {
        &self.info
    }

    /// Whether the path exists.
    pub fn exists(&self) -> bool {
        self.state().exists
    }

    /// Whether the path is a directory.
    pub fn is_directory(&self) -> bool {
        self.state().is_directory
    }

    /// Last modification time, when the path exists.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.state().last_modified
    }

    fn state(&self) -> FileState {
        let Some(generation) = self.info.generation() else {
            return FileState::stat(&self.path);
        };

        let mut snapshot = self.snapshot.lock();
        match *snapshot {
            Some((seen, state)) if seen == generation => state,
            _ => {
                let state = FileState::stat(&self.path);
                *snapshot = Some((generation, state));
                state
            }
        }
    }
}
