//! Restore policy at the audio graph's decision points
//!
//! Every function here reads preferences from the store and acts on the
//! graph; none of them write preferences. Streams without an identity are
//! skipped everywhere.

use crate::core::{AudioCore, DeviceInfo, FixateData, HookResult, NewStreamData, StreamInfo};
use crate::entry::Entry;
use crate::identity::stream_group;
use crate::store::PreferenceStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which preferences are restored and when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub restore_device: bool,
    pub restore_volume: bool,
    pub restore_muted: bool,
    /// Move remembered streams to a device when it appears
    pub on_hotplug: bool,
    /// Move streams off a device that disappears to their remembered device
    pub on_rescue: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            restore_device: true,
            restore_volume: true,
            restore_muted: true,
            on_hotplug: true,
            on_rescue: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreEngine {
    options: RestoreOptions,
}

impl RestoreEngine {
    pub fn new(options: RestoreOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RestoreOptions {
        &self.options
    }

    /// Pick the remembered device for a stream that has none yet
    pub fn on_new_stream(
        &self,
        store: &PreferenceStore,
        core: &dyn AudioCore,
        data: &mut NewStreamData,
    ) -> HookResult {
        if !self.options.restore_device || data.direct_on_input {
            return HookResult::Ok;
        }
        let Some(name) = stream_group(&data.properties, data.direction) else {
            return HookResult::Ok;
        };

        if data.device.is_some() {
            debug!("Not restoring device for stream {}, because already set", name);
            return HookResult::Ok;
        }

        let Some(entry) = store.read_entry(&name) else {
            return HookResult::Ok;
        };

        let device = entry
            .device
            .as_deref()
            .and_then(|d| core.device(data.direction, d))
            .or_else(|| {
                entry
                    .card
                    .as_deref()
                    .and_then(|c| core.card_first_device(data.direction, c))
            });

        if let Some(device) = device.filter(|d| d.linked) {
            info!("Restoring device for stream {}", name);
            data.set_device(&device, true);
        }

        HookResult::Ok
    }

    /// Apply remembered volume and mute unless the creator chose its own
    pub fn on_fixate(&self, store: &PreferenceStore, data: &mut FixateData) -> HookResult {
        if !self.options.restore_volume && !self.options.restore_muted {
            return HookResult::Ok;
        }
        let Some(name) = stream_group(&data.properties, data.direction) else {
            return HookResult::Ok;
        };
        let Some(entry) = store.read_entry(&name) else {
            return HookResult::Ok;
        };

        if self.options.restore_volume {
            if let Some(stored) = &entry.volume {
                if !data.volume_writable {
                    debug!("Not restoring volume for stream {}, because its volume can't be changed", name);
                } else if data.volume_is_set {
                    debug!("Not restoring volume for stream {}, because already set", name);
                } else {
                    info!("Restoring volume for stream {}", name);
                    let volume = stored.volume.remap(&stored.channel_map, &data.channel_map);
                    data.set_volume(volume);
                    data.volume_is_absolute = false;
                    data.save_volume = true;
                }
            }
        }

        if self.options.restore_muted {
            if let Some(muted) = entry.muted {
                if data.muted_is_set {
                    debug!("Not restoring mute state for stream {}, because already set", name);
                } else {
                    info!("Restoring mute state for stream {}", name);
                    data.set_muted(muted);
                    data.save_muted = true;
                }
            }
        }

        HookResult::Ok
    }

    /// Pull streams that remember `device` onto it now that it exists
    pub fn on_device_available(
        &self,
        store: &PreferenceStore,
        core: &mut dyn AudioCore,
        device: &DeviceInfo,
    ) -> HookResult {
        if !self.options.restore_device || !self.options.on_hotplug {
            return HookResult::Ok;
        }

        for stream in core.streams() {
            if stream.direction() != device.direction
                || stream.device.as_deref() == Some(device.name.as_str())
            {
                continue;
            }
            // Streams the user routed explicitly stay where they are
            if stream.save_device
                || stream.device.is_none()
                || !stream.linked
                || stream.direct_on_input
            {
                continue;
            }
            let Some(name) = stream_group(&stream.properties, stream.direction()) else {
                continue;
            };
            let Some(entry) = store.read_entry(&name) else {
                continue;
            };
            if entry.device.as_deref() == Some(device.name.as_str()) {
                info!("Restoring device for stream {}", name);
                core.move_stream(stream.id, &device.name, true);
            }
        }

        HookResult::Ok
    }

    /// Move streams off a vanishing device to the device they remember
    pub fn on_device_removed(
        &self,
        store: &PreferenceStore,
        core: &mut dyn AudioCore,
        device: &DeviceInfo,
    ) -> HookResult {
        if !self.options.restore_device || !self.options.on_rescue {
            return HookResult::Ok;
        }
        // Devices vanish in bulk during shutdown; nothing to rescue to
        if core.is_shutting_down() {
            return HookResult::Ok;
        }

        for stream in core.streams() {
            if stream.direction() != device.direction
                || stream.device.as_deref() != Some(device.name.as_str())
                || stream.direct_on_input
            {
                continue;
            }
            let Some(name) = stream_group(&stream.properties, stream.direction()) else {
                continue;
            };
            let Some(remembered) = store.read_entry(&name).and_then(|e| e.device) else {
                continue;
            };

            let target = core
                .device(stream.direction(), &remembered)
                .filter(|d| d.name != device.name && d.linked);
            match target {
                Some(target) => {
                    info!("Restoring device for stream {}", name);
                    core.move_stream(stream.id, &target.name, true);
                }
                None => release_device(core, &stream),
            }
        }

        HookResult::Ok
    }

    /// Push `entry` onto every live stream whose identity is `key`.
    ///
    /// Unlike the creation-time hooks this ignores whatever the stream was
    /// created with. Returns the number of streams touched.
    pub fn apply(&self, core: &mut dyn AudioCore, key: &str, entry: &Entry) -> usize {
        let mut touched = 0;

        for stream in core.streams() {
            if stream_group(&stream.properties, stream.direction()).as_deref() != Some(key) {
                continue;
            }
            touched += 1;

            if self.options.restore_volume && stream.volume_writable {
                if let Some(stored) = &entry.volume {
                    info!("Restoring volume for stream {}", key);
                    let volume = stored.volume.remap(&stored.channel_map, &stream.channel_map);
                    core.set_stream_volume(stream.id, &volume, true);
                }
            }

            if self.options.restore_muted {
                if let Some(muted) = entry.muted {
                    info!("Restoring mute state for stream {}", key);
                    core.set_stream_mute(stream.id, muted, true);
                }
            }

            if self.options.restore_device {
                match &entry.device {
                    None => release_device(core, &stream),
                    Some(device) => {
                        if core.device(stream.direction(), device).is_some() {
                            info!("Restoring device for stream {}", key);
                            core.move_stream(stream.id, device, true);
                        }
                    }
                }
            }
        }

        touched
    }
}

// Forget that the stream's device was a user choice so routing can pick another
fn release_device(core: &mut dyn AudioCore, stream: &StreamInfo) {
    if stream.save_device {
        debug!("Clearing remembered device flag on {}", stream.id);
        core.set_save_device(stream.id, false);
        core.post_stream_changed(stream.id);
    }
}
