//! # Memoization and File-Change Detection
//!
//! Every directory below a watched root owns a generation counter. A change
//! anywhere inside a directory bumps the counter of that directory and of
//! every ancestor up to the root, so a counter describes a whole subtree.
//! Consumers record the generation they last observed and only go back to the
//! filesystem once the counter has moved on.
//!
//! Counters are plain atomics: the watcher thread is their only writer and
//! readers never take a lock.
//! Removing a directory retires its counters and those below it; infos still
//! holding a retired counter report no generation, like unwatched paths.
//!
//! - [`FileModificationRegistry`]: owns the per-directory counters.
//! - [`FileModificationInfo`]: lock-free generation query for one subtree.
//! - [`FileInfo`]: cached existence, type and modification time of a path.
//! - [`MemoizedValue`]: a value recomputed only after a generation change.
//! - [`WatchService`]: forwards OS events from `notify` to the registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use walkdir::WalkDir;

use crate::core::error::{BundlerError, Result};

/// Cached file state backed by generation counters.
pub mod file_info;
/// Bridges `notify` events onto the registry counters.
pub mod watch;

pub use file_info::FileInfo;
pub use watch::WatchService;

/// Kind of filesystem change reported to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A file or directory appeared.
    Create,
    /// A file or directory changed.
    Modify,
    /// A file or directory disappeared.
    Remove,
}

/// Per-subtree generation counters for a watched root.
///
/// A registry without a root is *pessimistic*: every info it hands out
/// reports a change on every query, which keeps callers correct when no
/// watcher is running.
#[derive(Debug)]
pub struct FileModificationRegistry {
    root: Option<PathBuf>,
    counters: RwLock<HashMap<PathBuf, Arc<AtomicU64>>>,
}

impl FileModificationRegistry {
    /// Creates a registry that never caches anything.
    pub fn pessimistic() -> Self {
        Self {
            root: None,
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry with one counter for `root` and each directory below it.
    pub fn watching<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(BundlerError::config_error(
                "Watched root is not a directory",
                Some(root),
            ));
        }

        let registry = Self {
            root: Some(root.clone()),
            counters: RwLock::new(HashMap::new()),
        };
        registry.register_tree(&root);
        Ok(registry)
    }

    /// The watched root, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Returns the modification info covering `path`.
    ///
    /// Directories use their own counter; files use the counter of the
    /// nearest registered ancestor. Paths outside the root are pessimistic.
    pub fn info_for(&self, path: &Path) -> FileModificationInfo {
        let counters = self.counters.read();
        let mut current = Some(path);
        while let Some(candidate) = current {
            if let Some(counter) = counters.get(candidate) {
                return FileModificationInfo {
                    counter: Some(Arc::clone(counter)),
                };
            }
            current = candidate.parent();
        }
        FileModificationInfo::pessimistic()
    }

    /// Current generation of a registered directory.
    pub fn generation(&self, dir: &Path) -> Option<u64> {
        self.counters
            .read()
            .get(dir)
            .map(|counter| counter.load(Ordering::Acquire))
    }

    /// Records a change at `path`, bumping the counters of its subtree chain.
    pub fn record_change(&self, path: &Path, kind: ChangeKind) {
        if self.root.is_none() {
            return;
        }
        if kind == ChangeKind::Create && path.is_dir() {
            self.register_tree(path);
        }

        let counters = self.counters.read();
        let mut current = Some(path);
        let mut bumped = 0usize;
        while let Some(candidate) = current {
            if let Some(counter) = counters.get(candidate) {
                _ = counter.fetch_add(1, Ordering::AcqRel);
                bumped += 1;
            }
            if Some(candidate) == self.root.as_deref() {
                break;
            }
            current = candidate.parent();
        }
        trace!("{:?} at '{}' bumped {} counters", kind, path.display(), bumped);
        drop(counters);

        if kind == ChangeKind::Remove {
            self.retire_tree(path);
        }
    }

    /// Reduces a `notify` event to counter bumps.
    pub fn handle_event(&self, event: &notify::Event) {
        let kind = if event.kind.is_create() {
            ChangeKind::Create
        } else if event.kind.is_remove() {
            ChangeKind::Remove
        } else if event.kind.is_modify() {
            ChangeKind::Modify
        } else {
            return;
        };

        for path in &event.paths {
            self.record_change(path, kind);
        }
    }

    /// Drops the counters of `dir` and every directory below it. Infos still
    /// holding one of them turn pessimistic.
    fn retire_tree(&self, dir: &Path) {
        let mut counters = self.counters.write();
        let root = self.root.as_deref();
        let retired: Vec<PathBuf> = counters
            .keys()
            .filter(|path| path.starts_with(dir) && Some(path.as_path()) != root)
            .cloned()
            .collect();
        for path in retired {
            if let Some(counter) = counters.remove(&path) {
                counter.store(RETIRED, Ordering::Release);
                debug!("No longer watching directory '{}'", path.display());
            }
        }
    }

    fn register_tree(&self, dir: &Path) {
        let mut counters = self.counters.write();
        for entry in WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
        {
            let path = entry.into_path();
            if !counters.contains_key(&path) {
                debug!("Watching directory '{}'", path.display());
                _ = counters.insert(path, Arc::new(AtomicU64::new(0)));
            }
        }
    }
}

/// Lock-free view of one subtree generation counter.
#[derive(Debug, Clone)]
pub struct FileModificationInfo {
    counter: Option<Arc<AtomicU64>>,
}

impl FileModificationInfo {
    /// An info that is never up to date.
    pub fn pessimistic() -> Self {
        Self { counter: None }
    }

    /// The current generation, or `None` when the subtree is not watched
    /// (any more).
    pub fn generation(&self) -> Option<u64> {
        self.counter
            .as_ref()
            .map(|counter| counter.load(Ordering::Acquire))
            .filter(|generation| *generation != RETIRED)
    }
}

const NEVER_CHECKED: u64 = u64::MAX;
const RETIRED: u64 = u64::MAX - 1;

/// Tracks whether a subtree changed since the previous call.
#[derive(Debug)]
pub struct FileModifiedChecker {
    info: FileModificationInfo,
    last_seen: AtomicU64,
}

impl FileModifiedChecker {
    /// Creates a checker that reports a change on its first call.
    pub fn new(info: FileModificationInfo) -> Self {
        Self {
            info,
            last_seen: AtomicU64::new(NEVER_CHECKED),
        }
    }

    /// Returns `true` when the generation moved since the last call.
    pub fn has_changed_since_last_check(&self) -> bool {
        match self.info.generation() {
            Some(generation) => {
                self.last_seen.swap(generation, Ordering::AcqRel) != generation
            }
            None => true,
        }
    }
}

/// A value recomputed only when the generation of its subtree changed.
#[derive(Debug)]
pub struct MemoizedValue<T> {
    info: FileModificationInfo,
    cached: Mutex<Option<(u64, T)>>,
}

impl<T: Clone> MemoizedValue<T> {
    /// Creates an empty memoized value guarded by `info`.
    pub fn new(info: FileModificationInfo) -> Self {
        Self {
            info,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached value, or computes and caches a fresh one.
    ///
    /// Failed computations are not cached.
    pub fn value<F>(&self, compute: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let Some(generation) = self.info.generation() else {
            return compute();
        };

        let mut cached = self.cached.lock();
        if let Some((seen, value)) = cached.as_ref() {
            if *seen == generation {
                return Ok(value.clone());
            }
        }

        let value = compute()?;
        *cached = Some((generation, value.clone()));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_registry_bumps_subtree_chain() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();
        let sibling = temp_dir.path().join("c");
        fs::create_dir(&sibling).unwrap();

        registry.record_change(&nested.join("file.js"), ChangeKind::Modify);

        assert_eq!(registry.generation(&nested), Some(1));
        assert_eq!(registry.generation(&temp_dir.path().join("a")), Some(1));
        assert_eq!(registry.generation(temp_dir.path()), Some(1));
        assert_eq!(registry.generation(&sibling), None);
    }

    #[test]
    fn test_registry_registers_created_directories() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();

        let created = temp_dir.path().join("new").join("deeper");
        fs::create_dir_all(&created).unwrap();
        registry.record_change(
            &temp_dir.path().join("new"),
            ChangeKind::Create,
        );

        assert!(registry.generation(&created).is_some());
        let info = registry.info_for(&created.join("x.js"));
        let before = info.generation().unwrap();
        registry.record_change(&created.join("x.js"), ChangeKind::Create);
        assert_eq!(info.generation(), Some(before + 1));
    }

    #[test]
    fn test_removed_directories_drop_their_counters() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let nested = a.join("b");
        fs::create_dir_all(&nested).unwrap();
        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();
        let info = registry.info_for(&nested.join("x.js"));
        assert_eq!(info.generation(), Some(0));

        fs::remove_dir_all(&a).unwrap();
        registry.record_change(&a, ChangeKind::Remove);

        assert_eq!(registry.generation(&a), None);
        assert_eq!(registry.generation(&nested), None);
        assert_eq!(registry.generation(temp_dir.path()), Some(1));
        assert_eq!(info.generation(), None);

        fs::create_dir_all(&nested).unwrap();
        registry.record_change(&a, ChangeKind::Create);
        assert_eq!(registry.generation(&nested), Some(0));
        assert_eq!(registry.info_for(&nested.join("x.js")).generation(), Some(0));
    }

    #[test]
    fn test_handle_event_ignores_access_events() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();
        let path = temp_dir.path().join("file.txt");

        let access = notify::Event::new(notify::EventKind::Access(
            notify::event::AccessKind::Any,
        ))
        .add_path(path.clone());
        registry.handle_event(&access);
        assert_eq!(registry.generation(temp_dir.path()), Some(0));

        let modify = notify::Event::new(notify::EventKind::Modify(
            notify::event::ModifyKind::Any,
        ))
        .add_path(path);
        registry.handle_event(&modify);
        assert_eq!(registry.generation(temp_dir.path()), Some(1));
    }

    #[test]
    fn test_pessimistic_registry_always_reports_change() {
        let registry = FileModificationRegistry::pessimistic();
        let checker =
            FileModifiedChecker::new(registry.info_for(Path::new("/tmp")));
        assert!(checker.has_changed_since_last_check());
        assert!(checker.has_changed_since_last_check());
    }

    #[test]
    fn test_checker_tracks_generation() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();
        let checker =
            FileModifiedChecker::new(registry.info_for(temp_dir.path()));

        assert!(checker.has_changed_since_last_check());
        assert!(!checker.has_changed_since_last_check());
        registry.record_change(temp_dir.path(), ChangeKind::Modify);
        assert!(checker.has_changed_since_last_check());
        assert!(!checker.has_changed_since_last_check());
    }

    #[test]
    fn test_memoized_value_recomputes_after_bump() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();
        let memo = MemoizedValue::new(registry.info_for(temp_dir.path()));
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(calls.get())
        };

        assert_eq!(memo.value(compute).unwrap(), 1);
        assert_eq!(memo.value(compute).unwrap(), 1);
        registry.record_change(temp_dir.path(), ChangeKind::Modify);
        assert_eq!(memo.value(compute).unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_memoized_value_does_not_cache_failures() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            FileModificationRegistry::watching(temp_dir.path()).unwrap();
        let memo: MemoizedValue<u32> =
            MemoizedValue::new(registry.info_for(temp_dir.path()));

        assert!(memo
            .value(|| Err(BundlerError::internal_error("boom")))
            .is_err());
        assert_eq!(memo.value(|| Ok(7)).unwrap(), 7);
    }
}
