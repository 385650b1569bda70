//! Object-model surface: one container object plus one object per entry
//!
//! Entry objects are addressed by object path. Getters always re-read the
//! entry from the store.

use super::StreamRestore;
use crate::core::AudioCore;
use crate::entry::{is_valid_name, Entry, StoredVolume};
use crate::error::{InvalidEntry, RestoreError};
use crate::mirror::INTERFACE_REVISION;
use crate::tracker::entries_equal;
use tracing::debug;

/// `GetAll` on the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProperties {
    pub interface_revision: u32,
    pub entries: Vec<String>,
}

/// `GetAll` on an entry object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProperties {
    pub index: u32,
    pub name: String,
    pub device: String,
    pub volume: Vec<(u32, u32)>,
    pub mute: bool,
}

impl StreamRestore {
    pub fn interface_revision(&self) -> u32 {
        INTERFACE_REVISION
    }

    /// Object paths of all entries
    pub fn entries(&self) -> Vec<String> {
        self.mirror.object_paths()
    }

    pub fn container_properties(&self) -> ContainerProperties {
        ContainerProperties {
            interface_revision: self.interface_revision(),
            entries: self.entries(),
        }
    }

    /// Create or overwrite the entry `name`; returns its object path
    pub fn add_entry(
        &mut self,
        core: &mut dyn AudioCore,
        name: &str,
        device: &str,
        volume: &[(u32, u32)],
        mute: bool,
        apply_immediately: bool,
    ) -> Result<String, RestoreError> {
        if name.is_empty() {
            return Err(RestoreError::EmptyName);
        }

        let mut entry = Entry::new();
        entry.volume = StoredVolume::from_pairs(volume)?;
        entry.muted = Some(mute);
        entry.device = parse_device(device)?;

        let old = self.store.read_entry(name);
        if !old.as_ref().is_some_and(|old| entries_equal(old, &entry)) {
            self.commit(name, &entry)?;
            self.announce(name, old.as_ref(), &entry);
            self.tracker.trigger_save();
        }

        if apply_immediately {
            self.engine.apply(core, name, &entry);
        }

        Ok(self.mirror.ensure(name).object_path)
    }

    pub fn get_entry_by_name(&self, name: &str) -> Result<String, RestoreError> {
        self.mirror
            .get(name)
            .map(|e| e.object_path.clone())
            .ok_or_else(|| RestoreError::NotFound(name.to_owned()))
    }

    pub fn entry_index(&self, path: &str) -> Result<u32, RestoreError> {
        self.mirror
            .by_path(path)
            .map(|e| e.index)
            .ok_or_else(|| RestoreError::NotFound(path.to_owned()))
    }

    pub fn entry_name(&self, path: &str) -> Result<String, RestoreError> {
        self.name_for_path(path)
    }

    /// Remembered device, empty when there is none
    pub fn entry_device(&self, path: &str) -> Result<String, RestoreError> {
        Ok(self.entry_at(path)?.1.device.unwrap_or_default())
    }

    /// Remembered volume as `(position, value)` pairs, empty when there is none
    pub fn entry_volume(&self, path: &str) -> Result<Vec<(u32, u32)>, RestoreError> {
        Ok(self
            .entry_at(path)?
            .1
            .volume
            .map(|v| v.to_pairs())
            .unwrap_or_default())
    }

    pub fn entry_mute(&self, path: &str) -> Result<bool, RestoreError> {
        Ok(self.entry_at(path)?.1.muted.unwrap_or(false))
    }

    pub fn entry_properties(&self, path: &str) -> Result<EntryProperties, RestoreError> {
        let (name, entry) = self.entry_at(path)?;
        Ok(EntryProperties {
            index: self.entry_index(path)?,
            name,
            device: entry.device.unwrap_or_default(),
            volume: entry.volume.map(|v| v.to_pairs()).unwrap_or_default(),
            mute: entry.muted.unwrap_or(false),
        })
    }

    pub fn set_entry_device(
        &mut self,
        core: &mut dyn AudioCore,
        path: &str,
        device: &str,
    ) -> Result<(), RestoreError> {
        let device = parse_device(device)?;
        let (name, old) = self.entry_at(path)?;
        if old.device == device {
            return Ok(());
        }
        let mut entry = old.clone();
        entry.device = device;
        self.update_entry(core, &name, &old, &entry)
    }

    pub fn set_entry_volume(
        &mut self,
        core: &mut dyn AudioCore,
        path: &str,
        volume: &[(u32, u32)],
    ) -> Result<(), RestoreError> {
        let volume = StoredVolume::from_pairs(volume)?;
        if let Some(v) = &volume {
            v.validate()?;
        }
        let (name, old) = self.entry_at(path)?;
        if old.volume == volume {
            return Ok(());
        }
        let mut entry = old.clone();
        entry.volume = volume;
        self.update_entry(core, &name, &old, &entry)
    }

    pub fn set_entry_mute(
        &mut self,
        core: &mut dyn AudioCore,
        path: &str,
        mute: bool,
    ) -> Result<(), RestoreError> {
        let (name, old) = self.entry_at(path)?;
        if old.muted == Some(mute) {
            return Ok(());
        }
        let mut entry = old.clone();
        entry.muted = Some(mute);
        self.update_entry(core, &name, &old, &entry)
    }

    /// `Remove` on an entry object
    pub fn remove_entry(&mut self, path: &str) -> Result<(), RestoreError> {
        let name = self.name_for_path(path)?;
        let removed = self.store.unset(&name);
        self.mirror.remove(&name);
        if removed {
            self.tracker.trigger_save();
        }
        Ok(())
    }

    fn name_for_path(&self, path: &str) -> Result<String, RestoreError> {
        self.mirror
            .by_path(path)
            .map(|e| e.name.clone())
            .ok_or_else(|| RestoreError::NotFound(path.to_owned()))
    }

    fn entry_at(&self, path: &str) -> Result<(String, Entry), RestoreError> {
        let name = self.name_for_path(path)?;
        match self.store.read_entry(&name) {
            Some(entry) => Ok((name, entry)),
            None => {
                debug!("Mirrored entry {} has no readable record", path);
                Err(RestoreError::NotFound(name))
            }
        }
    }

    fn update_entry(
        &mut self,
        core: &mut dyn AudioCore,
        name: &str,
        old: &Entry,
        entry: &Entry,
    ) -> Result<(), RestoreError> {
        self.commit(name, entry)?;
        self.engine.apply(core, name, entry);
        self.mirror.emit_diff(name, old, entry);
        self.tracker.trigger_save();
        Ok(())
    }
}

// Empty means "no device"
fn parse_device(device: &str) -> Result<Option<String>, RestoreError> {
    if device.is_empty() {
        return Ok(None);
    }
    if !is_valid_name(device) {
        return Err(InvalidEntry::InvalidName(device.to_owned()).into());
    }
    Ok(Some(device.to_owned()))
}
