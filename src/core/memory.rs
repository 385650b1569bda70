//! In-memory audio graph used by the command-line tool and tests

use super::{AudioCore, DeviceInfo, Direction, StreamId, StreamInfo};
use crate::volume::CVolume;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Default)]
pub struct MemoryCore {
    streams: BTreeMap<StreamId, StreamInfo>,
    devices: Vec<DeviceInfo>,
    /// Every `post_stream_changed` call, in order
    pub changes_posted: Vec<StreamId>,
    /// Every successful move, in order
    pub moves: Vec<(StreamId, String)>,
    pub shutting_down: bool,
}

impl MemoryCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, device: DeviceInfo) {
        self.devices
            .retain(|d| !(d.name == device.name && d.direction == device.direction));
        self.devices.push(device);
    }

    /// Mark a device as gone; it no longer resolves by name
    pub fn unlink_device(&mut self, direction: Direction, name: &str) -> Option<DeviceInfo> {
        let pos = self
            .devices
            .iter()
            .position(|d| d.direction == direction && d.name == name)?;
        Some(self.devices.remove(pos))
    }

    pub fn add_stream(&mut self, stream: StreamInfo) {
        self.streams.insert(stream.id, stream);
    }

    pub fn remove_stream(&mut self, id: StreamId) -> Option<StreamInfo> {
        self.streams.remove(&id)
    }

    pub fn get(&self, id: StreamId) -> Option<&StreamInfo> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut StreamInfo> {
        self.streams.get_mut(&id)
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }
}

impl AudioCore for MemoryCore {
    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.values().cloned().collect()
    }

    fn stream(&self, id: StreamId) -> Option<StreamInfo> {
        self.streams.get(&id).cloned()
    }

    fn device(&self, direction: Direction, name: &str) -> Option<DeviceInfo> {
        self.devices
            .iter()
            .find(|d| d.direction == direction && d.name == name)
            .cloned()
    }

    fn card_first_device(&self, direction: Direction, card: &str) -> Option<DeviceInfo> {
        self.devices
            .iter()
            .find(|d| d.direction == direction && d.card.as_deref() == Some(card))
            .cloned()
    }

    fn move_stream(&mut self, id: StreamId, device: &str, save: bool) -> bool {
        let linked = self
            .device(id.direction, device)
            .map(|d| d.linked)
            .unwrap_or(false);
        let Some(stream) = self.streams.get_mut(&id) else {
            return false;
        };
        if !linked {
            return false;
        }
        trace!("Moving {} to {}", id, device);
        stream.device = Some(device.to_owned());
        stream.save_device = save;
        self.moves.push((id, device.to_owned()));
        true
    }

    fn set_stream_volume(&mut self, id: StreamId, volume: &CVolume, save: bool) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.volume = volume.clone();
            stream.save_volume = save;
        }
    }

    fn set_stream_mute(&mut self, id: StreamId, muted: bool, save: bool) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.muted = muted;
            stream.save_muted = save;
        }
    }

    fn set_save_device(&mut self, id: StreamId, save: bool) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.save_device = save;
        }
    }

    fn post_stream_changed(&mut self, id: StreamId) {
        self.changes_posted.push(id);
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}
