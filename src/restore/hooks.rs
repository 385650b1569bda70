//! Audio graph listeners

use super::{Hook, StreamRestore};
use crate::core::{AudioCore, DeviceInfo, FixateData, HookResult, NewStreamData, StreamInfo};
use crate::identity::stream_group;
use crate::tracker::entries_equal;
use tracing::{info, trace};

impl StreamRestore {
    /// A stream is being created and has not picked a device yet
    pub fn on_new_stream(&self, core: &dyn AudioCore, data: &mut NewStreamData) -> HookResult {
        if !self.is_registered(Hook::NewStream) {
            return HookResult::Ok;
        }
        self.engine.on_new_stream(&self.store, core, data)
    }

    /// A stream's format is fixed; volume and mute can still be chosen
    pub fn on_fixate(&self, data: &mut FixateData) -> HookResult {
        if !self.is_registered(Hook::Fixate) {
            return HookResult::Ok;
        }
        self.engine.on_fixate(&self.store, data)
    }

    /// A device has been plugged in
    pub fn on_device_available(&mut self, core: &mut dyn AudioCore, device: &DeviceInfo) -> HookResult {
        if !self.is_registered(Hook::DeviceAvailable) {
            return HookResult::Ok;
        }
        self.engine.on_device_available(&self.store, core, device)
    }

    /// A device is going away
    pub fn on_device_removed(&mut self, core: &mut dyn AudioCore, device: &DeviceInfo) -> HookResult {
        if !self.is_registered(Hook::DeviceRemoved) {
            return HookResult::Ok;
        }
        self.engine.on_device_removed(&self.store, core, device)
    }

    /// A stream appeared or changed: remember whatever its save flags mark
    /// as the user's choice.
    pub fn observe_stream(&mut self, core: &dyn AudioCore, stream: &StreamInfo) {
        if !self.is_registered(Hook::StreamChanged) {
            return;
        }
        let Some(name) = stream_group(&stream.properties, stream.direction()) else {
            return;
        };

        let old = self.store.read_entry(&name);
        let mut entry = old.clone().unwrap_or_default();

        if stream.save_volume && stream.volume_readable {
            entry.set_volume(stream.channel_map.clone(), stream.volume.clone());
        }
        if stream.save_muted {
            entry.muted = Some(stream.muted);
        }
        if stream.save_device {
            if let Some(device) = &stream.device {
                entry.device = Some(device.clone());
                if let Some(card) = core
                    .device(stream.direction(), device)
                    .and_then(|d| d.card)
                {
                    entry.card = Some(card);
                }
            }
        }

        match &old {
            Some(old) if entries_equal(old, &entry) => return,
            None if entry.is_empty() => return,
            _ => {}
        }

        trace!("Storing preferences for {} under {:?}", stream.id, name);
        if let Err(e) = entry.validate() {
            info!("Not storing preferences for stream {}: {}", name, e);
            return;
        }
        if !self.store.write_entry(&name, &entry, true) {
            return;
        }

        info!("Storing preferences for stream {}", name);
        self.announce(&name, old.as_ref(), &entry);
        self.tracker.trigger_save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Direction, MemoryCore, PropertyList, StreamId};
    use crate::engine::RestoreOptions;
    use crate::entry::Entry;
    use crate::identity::IDENTIFICATION_PROPERTY;
    use crate::mirror::MirrorSignal;
    use crate::store::PreferenceStore;
    use crate::volume::{CVolume, ChannelMap, ChannelPosition};
    use std::time::Duration;

    fn props(id: &str) -> PropertyList {
        let mut p = PropertyList::new();
        p.insert(IDENTIFICATION_PROPERTY.to_string(), id.to_string());
        p
    }

    fn restore(options: RestoreOptions) -> StreamRestore {
        StreamRestore::new(
            PreferenceStore::temporary().unwrap(),
            options,
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_observe_stores_saved_fields_with_card() {
        let mut r = restore(RestoreOptions::default());
        let mut signals = r.subscribe_signals();
        let mut core = MemoryCore::new();
        core.add_device(DeviceInfo::new("usb", Direction::Playback, Some("usb-card")));

        let mut s = StreamInfo::new(StreamId::playback(1), props("alice"), Some("usb"));
        s.save_device = true;
        s.save_muted = true;
        s.muted = true;
        r.observe_stream(&core, &s);

        let e = r.store().read_entry("alice").unwrap();
        assert_eq!(e.device.as_deref(), Some("usb"));
        assert_eq!(e.card.as_deref(), Some("usb-card"));
        assert_eq!(e.muted, Some(true));
        // volume was not flagged for saving
        assert_eq!(e.volume, None);
        assert!(matches!(signals.try_recv(), Ok(MirrorSignal::NewEntry { .. })));
    }

    #[test]
    fn test_observe_ignores_streams_without_save_flags() {
        let mut r = restore(RestoreOptions::default());
        let core = MemoryCore::new();
        let s = StreamInfo::new(StreamId::playback(1), props("alice"), Some("usb"));
        r.observe_stream(&core, &s);
        assert!(r.store().is_empty());
        assert!(r.mirror().is_empty());
    }

    #[test]
    fn test_observe_skips_unreadable_volume() {
        let mut r = restore(RestoreOptions::default());
        let core = MemoryCore::new();
        let mut s = StreamInfo::new(StreamId::playback(1), props("alice"), None);
        s.save_volume = true;
        s.volume_readable = false;
        r.observe_stream(&core, &s);
        assert!(r.store().is_empty());
    }

    #[test]
    fn test_observe_equal_entry_is_silent() {
        let mut r = restore(RestoreOptions::default());
        let mut stored = Entry::new();
        stored.set_volume(ChannelMap::stereo(), CVolume::new(vec![10, 20]));
        r.store().write_entry("alice", &stored, true);
        r.mirror.register("alice");
        let mut signals = r.subscribe_signals();

        // same volume, channels listed the other way round
        let core = MemoryCore::new();
        let mut s = StreamInfo::new(StreamId::playback(1), props("alice"), None);
        s.channel_map = ChannelMap::new(vec![ChannelPosition::FrontRight, ChannelPosition::FrontLeft]);
        s.volume = CVolume::new(vec![20, 10]);
        s.save_volume = true;
        r.observe_stream(&core, &s);

        assert!(signals.try_recv().is_err());
        assert_eq!(r.store().read_entry("alice").unwrap(), stored);
    }

    #[test]
    fn test_observe_stereo_stream_against_seeded_mono_entry() {
        let mut r = restore(RestoreOptions::default());
        assert!(r.seed_entry("alice", 0.0));
        let stored = r.store().read_entry("alice").unwrap();
        let mut signals = r.subscribe_signals();

        let core = MemoryCore::new();
        let mut s = StreamInfo::new(StreamId::playback(1), props("alice"), None);
        s.save_volume = true;
        r.observe_stream(&core, &s);

        assert!(signals.try_recv().is_err());
        assert_eq!(r.store().read_entry("alice").unwrap(), stored);
    }

    #[test]
    fn test_observe_changed_field_signals_once() {
        let mut r = restore(RestoreOptions::default());
        let mut stored = Entry::new();
        stored.muted = Some(false);
        r.store().write_entry("alice", &stored, true);
        r.mirror.register("alice");
        let mut signals = r.subscribe_signals();

        let core = MemoryCore::new();
        let mut s = StreamInfo::new(StreamId::playback(1), props("alice"), None);
        s.save_muted = true;
        s.muted = true;
        r.observe_stream(&core, &s);

        assert!(matches!(
            signals.try_recv(),
            Ok(MirrorSignal::MuteUpdated { muted: true, .. })
        ));
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_hooks_do_nothing() {
        let r = restore(RestoreOptions {
            restore_device: false,
            ..RestoreOptions::default()
        });
        let store = r.store().clone();
        let mut e = Entry::new();
        e.device = Some("usb".into());
        store.write_entry("alice", &e, true);

        let mut core = MemoryCore::new();
        core.add_device(DeviceInfo::new("usb", Direction::Playback, None));
        let mut data = NewStreamData::new(Direction::Playback, props("alice"));
        assert_eq!(r.on_new_stream(&core, &mut data), HookResult::Ok);
        assert_eq!(data.device, None);
    }
}
