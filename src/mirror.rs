//! Object-per-entry index exposed to the external object-model binding
//!
//! The mirror only maps keys to object ids and paths. It never caches entry
//! contents; readers go back to the [`PreferenceStore`](crate::store::PreferenceStore).

use crate::entry::Entry;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Path of the container object
pub const OBJECT_PATH: &str = "/org/pulseaudio/stream_restore1";
pub const INTERFACE_REVISION: u32 = 0;

const SIGNAL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub name: String,
    pub index: u32,
    pub object_path: String,
}

/// Signals emitted on the container (`NewEntry`, `EntryRemoved`) and on
/// entry objects (the `*Updated` variants)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorSignal {
    NewEntry { path: String },
    EntryRemoved { path: String },
    DeviceUpdated { path: String, device: String },
    VolumeUpdated { path: String, volume: Vec<(u32, u32)> },
    MuteUpdated { path: String, muted: bool },
}

pub struct ControlMirror {
    entries: HashMap<String, MirrorEntry>,
    next_index: u32,
    signals: broadcast::Sender<MirrorSignal>,
}

impl Default for ControlMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlMirror {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            entries: HashMap::new(),
            next_index: 0,
            signals,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorSignal> {
        self.signals.subscribe()
    }

    pub fn get(&self, name: &str) -> Option<&MirrorEntry> {
        self.entries.get(name)
    }

    pub fn by_path(&self, path: &str) -> Option<&MirrorEntry> {
        self.entries.values().find(|e| e.object_path == path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by index
    pub fn entries(&self) -> Vec<&MirrorEntry> {
        let mut all: Vec<&MirrorEntry> = self.entries.values().collect();
        all.sort_by_key(|e| e.index);
        all
    }

    pub fn object_paths(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|e| e.object_path.clone())
            .collect()
    }

    /// Register `name` without announcing it. Used when loading the store.
    pub fn register(&mut self, name: &str) -> MirrorEntry {
        if let Some(existing) = self.entries.get(name) {
            return existing.clone();
        }
        let index = self.next_index;
        self.next_index += 1;
        let entry = MirrorEntry {
            name: name.to_owned(),
            index,
            object_path: format!("{}/entry{}", OBJECT_PATH, index),
        };
        debug!("Registered {} for {:?}", entry.object_path, name);
        self.entries.insert(name.to_owned(), entry.clone());
        entry
    }

    /// Register `name` and emit `NewEntry` if it was not mirrored yet
    pub fn ensure(&mut self, name: &str) -> MirrorEntry {
        if let Some(existing) = self.entries.get(name) {
            return existing.clone();
        }
        let entry = self.register(name);
        self.emit(MirrorSignal::NewEntry {
            path: entry.object_path.clone(),
        });
        entry
    }

    /// Unregister `name`, emitting `EntryRemoved`. Unknown names are ignored.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(entry) => {
                self.emit(MirrorSignal::EntryRemoved {
                    path: entry.object_path,
                });
                true
            }
            None => false,
        }
    }

    /// Unregister everything, emitting `EntryRemoved` for each entry
    pub fn clear(&mut self) {
        let mut all: Vec<MirrorEntry> = self.entries.drain().map(|(_, e)| e).collect();
        all.sort_by_key(|e| e.index);
        for entry in all {
            self.emit(MirrorSignal::EntryRemoved {
                path: entry.object_path,
            });
        }
    }

    /// Emit one signal per logical field that differs between `old` and `new`.
    /// Returns the number of signals emitted.
    pub fn emit_diff(&self, name: &str, old: &Entry, new: &Entry) -> usize {
        let Some(entry) = self.entries.get(name) else {
            return 0;
        };
        let path = &entry.object_path;
        let mut emitted = 0;

        if old.device != new.device {
            self.emit(MirrorSignal::DeviceUpdated {
                path: path.clone(),
                device: new.device.clone().unwrap_or_default(),
            });
            emitted += 1;
        }
        if old.volume != new.volume {
            self.emit(MirrorSignal::VolumeUpdated {
                path: path.clone(),
                volume: new.volume.as_ref().map(|v| v.to_pairs()).unwrap_or_default(),
            });
            emitted += 1;
        }
        if old.muted != new.muted {
            self.emit(MirrorSignal::MuteUpdated {
                path: path.clone(),
                muted: new.muted.unwrap_or(false),
            });
            emitted += 1;
        }

        emitted
    }

    pub fn emit(&self, signal: MirrorSignal) {
        // No receivers is fine: nobody is listening on the bus
        let _ = self.signals.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{CVolume, ChannelMap};

    #[test]
    fn test_indices_are_monotonic() {
        let mut m = ControlMirror::new();
        let a = m.register("a");
        let b = m.register("b");
        assert_eq!(a.index, 0);
        assert_eq!(b.object_path, "/org/pulseaudio/stream_restore1/entry1");
        m.remove("a");
        let c = m.register("c");
        assert_eq!(c.index, 2);
        // re-registering is idempotent
        assert_eq!(m.register("b").index, 1);
        assert_eq!(m.object_paths(), vec![b.object_path, c.object_path]);
    }

    #[test]
    fn test_ensure_announces_once() {
        let mut m = ControlMirror::new();
        let mut rx = m.subscribe();
        let e = m.ensure("alice");
        m.ensure("alice");
        assert_eq!(
            rx.try_recv().unwrap(),
            MirrorSignal::NewEntry {
                path: e.object_path.clone()
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(m.by_path(&e.object_path).unwrap().name, "alice");
    }

    #[test]
    fn test_remove_unknown_is_silent() {
        let mut m = ControlMirror::new();
        let mut rx = m.subscribe();
        assert!(!m.remove("nobody"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_diff_emits_per_field() {
        let mut m = ControlMirror::new();
        let e = m.register("alice");
        let mut rx = m.subscribe();

        let old = Entry::new();
        let mut new = Entry::new();
        new.device = Some("usb".into());
        new.set_volume(ChannelMap::mono(), CVolume::new(vec![5]));

        assert_eq!(m.emit_diff("alice", &old, &new), 2);
        assert_eq!(
            rx.try_recv().unwrap(),
            MirrorSignal::DeviceUpdated {
                path: e.object_path.clone(),
                device: "usb".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            MirrorSignal::VolumeUpdated {
                path: e.object_path,
                volume: vec![(0, 5)]
            }
        );
        assert_eq!(m.emit_diff("alice", &new, &new), 0);
    }
}
