use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::FileModificationRegistry;
use crate::core::error::{BundlerError, Result};

/// Keeps a `notify` watcher alive and feeds its events to a registry.
///
/// Events arrive on the watcher's own thread; each one is reduced to atomic
/// counter bumps, so no lock is ever held around graph construction.
pub struct WatchService {
    _watcher: RecommendedWatcher,
    registry: Arc<FileModificationRegistry>,
}

impl WatchService {
    /// Starts watching the root of `registry` recursively.
    pub fn start(registry: Arc<FileModificationRegistry>) -> Result<Self> {
        let root = registry
            .root()
            .map(|root| root.to_path_buf())
            .ok_or_else(|| {
                BundlerError::internal_error(
                    "Cannot watch a pessimistic file modification registry",
                )
            })?;

        let sink = Arc::clone(&registry);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => sink.handle_event(&event),
                Err(err) => warn!("File watcher error: {}", err),
            },
            notify::Config::default(),
        )
        .map_err(|e| {
            BundlerError::internal_error(format!(
                "Failed to create file watcher: {}",
                e
            ))
        })?;

        watcher.watch(&root, RecursiveMode::Recursive).map_err(|e| {
            BundlerError::internal_error(format!(
                "Failed to watch '{}': {}",
                root.display(),
                e
            ))
        })?;

        info!("Started watching {}", root.display());
        Ok(Self {
            _watcher: watcher,
            registry,
        })
    }

    /// The registry receiving the events.
    pub fn registry(&self) -> &Arc<FileModificationRegistry> {
        &self.registry
    }
}

impl fmt::Debug for WatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchService")
            .field("root", &self.registry.root())
            .finish_non_exhaustive()
    }
}
