//! Audio graph collaborator
//!
//! The restore subsystem never owns streams or devices. It sees them through
//! [`AudioCore`], and is handed mutable "being created" stream records at the
//! two creation-time decision points.

pub mod memory;

pub use memory::MemoryCore;

use crate::volume::{CVolume, ChannelMap, VOLUME_NORM};
use std::collections::BTreeMap;
use std::fmt;

/// Stream/device properties
pub type PropertyList = BTreeMap<String, String>;

/// Playback streams feed sinks, record streams read from sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Playback,
    Record,
}

impl Direction {
    /// Prefix used in derived stream identities
    pub fn stream_prefix(self) -> &'static str {
        match self {
            Direction::Playback => "sink-input",
            Direction::Record => "source-output",
        }
    }

    pub fn device_kind(self) -> &'static str {
        match self {
            Direction::Playback => "sink",
            Direction::Record => "source",
        }
    }
}

/// Streams of each direction are numbered independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId {
    pub direction: Direction,
    pub index: u32,
}

impl StreamId {
    pub fn playback(index: u32) -> Self {
        Self {
            direction: Direction::Playback,
            index,
        }
    }

    pub fn record(index: u32) -> Self {
        Self {
            direction: Direction::Record,
            index,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.direction.stream_prefix(), self.index)
    }
}

/// Live stream as seen by the restore subsystem
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub id: StreamId,
    pub properties: PropertyList,
    /// `None` while the stream is being moved between devices
    pub device: Option<String>,
    pub channel_map: ChannelMap,
    pub volume: CVolume,
    pub muted: bool,
    pub volume_readable: bool,
    pub volume_writable: bool,
    pub save_device: bool,
    pub save_volume: bool,
    pub save_muted: bool,
    pub linked: bool,
    /// Record stream attached directly to a playback stream (peak meters)
    pub direct_on_input: bool,
}

impl StreamInfo {
    /// Linked stereo stream at unity gain with no save flags set
    pub fn new(id: StreamId, properties: PropertyList, device: Option<&str>) -> Self {
        Self {
            id,
            properties,
            device: device.map(str::to_owned),
            channel_map: ChannelMap::stereo(),
            volume: CVolume::uniform(2, VOLUME_NORM),
            muted: false,
            volume_readable: true,
            volume_writable: true,
            save_device: false,
            save_volume: false,
            save_muted: false,
            linked: true,
            direct_on_input: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.id.direction
    }
}

/// Sink or source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub direction: Direction,
    pub card: Option<String>,
    pub linked: bool,
}

impl DeviceInfo {
    pub fn new(name: &str, direction: Direction, card: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            direction,
            card: card.map(str::to_owned),
            linked: true,
        }
    }
}

/// Stream under construction, before a device has been chosen
#[derive(Debug, Clone)]
pub struct NewStreamData {
    pub direction: Direction,
    pub properties: PropertyList,
    pub device: Option<String>,
    /// The chosen device should be remembered for this stream
    pub save_device: bool,
    pub direct_on_input: bool,
}

impl NewStreamData {
    pub fn new(direction: Direction, properties: PropertyList) -> Self {
        Self {
            direction,
            properties,
            device: None,
            save_device: false,
            direct_on_input: false,
        }
    }

    /// Route the new stream to `device`; rejects devices of the other direction
    pub fn set_device(&mut self, device: &DeviceInfo, save: bool) -> bool {
        if device.direction != self.direction {
            return false;
        }
        self.device = Some(device.name.clone());
        self.save_device = save;
        true
    }
}

/// Stream under construction whose format is fixed but whose volume and mute
/// are still open
#[derive(Debug, Clone)]
pub struct FixateData {
    pub direction: Direction,
    pub properties: PropertyList,
    pub channel_map: ChannelMap,
    pub volume: Option<CVolume>,
    /// The creator asked for a specific volume
    pub volume_is_set: bool,
    pub volume_is_absolute: bool,
    pub volume_writable: bool,
    pub muted: bool,
    /// The creator asked for a specific mute state
    pub muted_is_set: bool,
    pub save_volume: bool,
    pub save_muted: bool,
}

impl FixateData {
    pub fn new(direction: Direction, properties: PropertyList, channel_map: ChannelMap) -> Self {
        Self {
            direction,
            properties,
            channel_map,
            volume: None,
            volume_is_set: false,
            volume_is_absolute: false,
            volume_writable: true,
            muted: false,
            muted_is_set: false,
            save_volume: false,
            save_muted: false,
        }
    }

    pub fn set_volume(&mut self, volume: CVolume) {
        self.volume = Some(volume);
        self.volume_is_set = true;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.muted_is_set = true;
    }
}

/// Disposition returned from every decision point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// Continue with the remaining listeners
    Ok,
    /// Stop processing the event
    Cancel,
}

/// Operations the restore subsystem needs from the audio graph
pub trait AudioCore {
    /// Snapshot of all live streams
    fn streams(&self) -> Vec<StreamInfo>;

    fn stream(&self, id: StreamId) -> Option<StreamInfo> {
        self.streams().into_iter().find(|s| s.id == id)
    }

    /// Device of the given direction by name
    fn device(&self, direction: Direction, name: &str) -> Option<DeviceInfo>;

    /// First device of the given direction that belongs to `card`
    fn card_first_device(&self, direction: Direction, card: &str) -> Option<DeviceInfo>;

    /// Move a stream; `save` marks the new device as the user's choice.
    /// Returns whether the move happened.
    fn move_stream(&mut self, id: StreamId, device: &str, save: bool) -> bool;

    fn set_stream_volume(&mut self, id: StreamId, volume: &CVolume, save: bool);

    fn set_stream_mute(&mut self, id: StreamId, muted: bool, save: bool);

    fn set_save_device(&mut self, id: StreamId, save: bool);

    /// Announce that a stream changed so other routing components react
    fn post_stream_changed(&mut self, id: StreamId);

    fn is_shutting_down(&self) -> bool {
        false
    }
}
