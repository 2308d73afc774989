//! Composition root wiring the multiplexer and the build tracker.
//!
//! Hosts that want the standard arrangement (OS watchers on the workspace's
//! configuration and output trees, a filesystem catalog, a tracker following
//! the per-deck channel) construct a [`Studio`] from [`Settings`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::{BuildProgressTracker, DeckCatalog, FsDeckCatalog};
use crate::config::Settings;
use crate::watcher::{WatchError, WatchMultiplexer};

pub struct Studio {
    config_root: PathBuf,
    output_root: PathBuf,
    multiplexer: WatchMultiplexer,
    tracker: BuildProgressTracker,
}

impl Studio {
    /// Studio with a catalog reading the workspace's output tree.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(settings: &Settings) -> Result<Self, WatchError> {
        let workspace = settings.resolved_workspace_root();
        let catalog = FsDeckCatalog::new(settings.watch.output_root(&workspace));
        Self::with_catalog(settings, Arc::new(catalog))
    }

    /// Studio with a host-provided catalog.
    pub fn with_catalog(
        settings: &Settings,
        catalog: Arc<dyn DeckCatalog>,
    ) -> Result<Self, WatchError> {
        let workspace = settings.resolved_workspace_root();
        let multiplexer = WatchMultiplexer::new(settings.watch.timing())?;

        let tracker = BuildProgressTracker::new(catalog);
        tracker.attach(&multiplexer);

        Ok(Self {
            config_root: settings.watch.config_root(&workspace),
            output_root: settings.watch.output_root(&workspace),
            multiplexer,
            tracker,
        })
    }

    /// Attach the OS watchers.
    pub fn start(&self) -> Result<(), WatchError> {
        self.multiplexer.watch(&self.config_root, &self.output_root)
    }

    pub fn multiplexer(&self) -> &WatchMultiplexer {
        &self.multiplexer
    }

    pub fn tracker(&self) -> &BuildProgressTracker {
        &self.tracker
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Tear down the tracker, then the multiplexer.
    pub fn dispose(&self) {
        self.tracker.dispose();
        self.multiplexer.dispose();
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        self.dispose();
    }
}
