//! StreamRestore - owns the preference store and everything built around it
//!
//! The coordinator is split across several files, each adding an
//! `impl StreamRestore` block:
//! - `hooks.rs`: audio graph decision points and stream observation
//! - `extension.rs`: the extension command set
//! - `objects.rs`: the object-model surface (container and entry objects)
//! - `cleanup.rs`: startup cleanup/migration and the fallback table

mod cleanup;
mod extension;
mod hooks;
mod objects;

pub use cleanup::CleanupReport;
pub use objects::{ContainerProperties, EntryProperties};

use crate::config::RestoreConfig;
use crate::core::AudioCore;
use crate::engine::{RestoreEngine, RestoreOptions};
use crate::entry::{Entry, EntryCodec};
use crate::error::RestoreError;
use crate::mirror::{ControlMirror, MirrorSignal};
use crate::seed::SeedTable;
use crate::store::PreferenceStore;
use crate::tracker::ChangeTracker;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Audio graph events the coordinator listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    NewStream,
    Fixate,
    DeviceAvailable,
    DeviceRemoved,
    StreamChanged,
    ConnectionClosed,
}

pub struct StreamRestore {
    store: PreferenceStore,
    engine: RestoreEngine,
    tracker: ChangeTracker,
    mirror: ControlMirror,
    hooks: Vec<Hook>,
}

impl StreamRestore {
    /// Wire up the components around an open store and register listeners.
    ///
    /// Every stored key gets a mirror entry; no startup passes run.
    pub fn new(store: PreferenceStore, options: RestoreOptions, save_interval: Duration) -> Self {
        let mut mirror = ControlMirror::new();
        for key in store.keys() {
            mirror.register(&key);
        }

        Self {
            tracker: ChangeTracker::new(store.clone(), save_interval),
            engine: RestoreEngine::new(options),
            hooks: hooks_for(&options),
            store,
            mirror,
        }
    }

    /// Full startup: cleanup pass, fallback table, then one observation of
    /// every live stream.
    pub fn init(
        store: PreferenceStore,
        config: &RestoreConfig,
        seed: &SeedTable,
        core: &mut dyn AudioCore,
    ) -> anyhow::Result<Self> {
        let mut restore = Self::new(store, config.options(), config.save_interval());

        let report = restore.clean_up_store();
        if !report.is_empty() {
            info!(
                "Cleaned preference database: {} migrated, {} removed",
                report.migrated.len(),
                report.removed.len()
            );
        }

        restore.load_seed_table(seed)?;

        for stream in core.streams() {
            restore.observe_stream(&*core, &stream);
        }

        info!(
            "Stream restore ready ({} entries, hooks: {:?})",
            restore.mirror.len(),
            restore.hooks
        );
        Ok(restore)
    }

    /// Tear down in reverse order of construction and flush the store
    pub fn shutdown(self) {
        let Self {
            store,
            mut tracker,
            mirror,
            hooks,
            ..
        } = self;
        debug!("Deregistering {} hooks", hooks.len());
        drop(mirror);
        tracker.shutdown();
        debug!("Closing preference database ({} entries)", store.len());
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn engine(&self) -> &RestoreEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn mirror(&self) -> &ControlMirror {
        &self.mirror
    }

    /// Listeners currently registered with the audio graph
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn is_registered(&self, hook: Hook) -> bool {
        self.hooks.contains(&hook)
    }

    /// Object-model signals (`NewEntry`, `DeviceUpdated`, …)
    pub fn subscribe_signals(&self) -> broadcast::Receiver<MirrorSignal> {
        self.mirror.subscribe()
    }

    // Write-through used by control operations; store failures are reported
    fn commit(&self, name: &str, entry: &Entry) -> Result<(), RestoreError> {
        self.store
            .set(name, &EntryCodec::encode(entry), true)
            .map(|_| ())
            .map_err(|e| {
                error!("Failed to store preference {:?}: {}", name, e);
                e.into()
            })
    }

    // Diff signals for keys already mirrored, `NewEntry` otherwise
    fn announce(&mut self, name: &str, old: Option<&Entry>, new: &Entry) {
        match old {
            Some(old) if self.mirror.contains(name) => {
                self.mirror.emit_diff(name, old, new);
            }
            _ => {
                self.mirror.ensure(name);
            }
        }
    }
}

fn hooks_for(options: &RestoreOptions) -> Vec<Hook> {
    let mut hooks = Vec::new();
    if options.restore_device {
        hooks.push(Hook::NewStream);
    }
    if options.restore_volume || options.restore_muted {
        hooks.push(Hook::Fixate);
    }
    if options.restore_device && options.on_hotplug {
        hooks.push(Hook::DeviceAvailable);
    }
    if options.restore_device && options.on_rescue {
        hooks.push(Hook::DeviceRemoved);
    }
    hooks.push(Hook::StreamChanged);
    hooks.push(Hook::ConnectionClosed);
    hooks
}
