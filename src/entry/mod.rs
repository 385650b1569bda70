//! Restorable preference set for one stream group

pub mod codec;

pub use codec::EntryCodec;

use crate::error::{InvalidEntry, RestoreError};
use crate::volume::{CVolume, ChannelMap, ChannelPosition, Volume, CHANNELS_MAX, VOLUME_MAX};

/// Current record layout version
pub const ENTRY_VERSION: u8 = 2;
/// Layout where every payload is written whether or not its flag is set
pub const LEGACY_ENTRY_VERSION: u8 = 1;
/// Device and card names must be shorter than this
pub const NAME_MAX: usize = 128;

/// Volume together with the channel map it is laid out in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVolume {
    pub channel_map: ChannelMap,
    pub volume: CVolume,
}

impl StoredVolume {
    /// Build from `(position, value)` pairs as exchanged by the control
    /// surface. An empty list means "no volume".
    pub fn from_pairs(pairs: &[(u32, u32)]) -> Result<Option<Self>, RestoreError> {
        if pairs.is_empty() {
            return Ok(None);
        }
        if pairs.len() > CHANNELS_MAX {
            return Err(InvalidEntry::InvalidChannelMap.into());
        }
        let mut positions = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for &(raw, value) in pairs {
            let pos = ChannelPosition::from_raw(raw).ok_or(InvalidEntry::InvalidChannelMap)?;
            if value > VOLUME_MAX {
                return Err(InvalidEntry::InvalidVolume.into());
            }
            positions.push(pos);
            values.push(value);
        }
        Ok(Some(Self {
            channel_map: ChannelMap::new(positions),
            volume: CVolume::new(values),
        }))
    }

    pub fn to_pairs(&self) -> Vec<(u32, Volume)> {
        self.channel_map
            .positions()
            .iter()
            .zip(self.volume.values())
            .map(|(p, v)| (p.to_raw() as u32, *v))
            .collect()
    }

    pub fn validate(&self) -> Result<(), InvalidEntry> {
        if !self.channel_map.is_valid() {
            return Err(InvalidEntry::InvalidChannelMap);
        }
        if !self.volume.is_valid() {
            return Err(InvalidEntry::InvalidVolume);
        }
        if self.volume.channels() != self.channel_map.channels() {
            return Err(InvalidEntry::IncompatibleVolume {
                volume: self.volume.channels(),
                map: self.channel_map.channels(),
            });
        }
        Ok(())
    }
}

/// Preferences remembered for one stream group. Each field is independently
/// present or absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub version: u8,
    pub volume: Option<StoredVolume>,
    pub muted: Option<bool>,
    pub device: Option<String>,
    pub card: Option<String>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            version: ENTRY_VERSION,
            volume: None,
            muted: None,
            device: None,
            card: None,
        }
    }
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a volume; a map without channels clears the volume instead
    pub fn set_volume(&mut self, channel_map: ChannelMap, volume: CVolume) {
        self.volume = if channel_map.channels() == 0 {
            None
        } else {
            Some(StoredVolume {
                channel_map,
                volume,
            })
        };
    }

    /// Nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.volume.is_none() && self.muted.is_none() && self.device.is_none() && self.card.is_none()
    }

    /// Semantic checks applied after decode and before every write
    pub fn validate(&self) -> Result<(), InvalidEntry> {
        if let Some(device) = &self.device {
            if !is_valid_name(device) {
                return Err(InvalidEntry::InvalidName(device.clone()));
            }
        }
        if let Some(card) = &self.card {
            if !is_valid_name(card) {
                return Err(InvalidEntry::InvalidName(card.clone()));
            }
        }
        if let Some(volume) = &self.volume {
            volume.validate()?;
        }
        Ok(())
    }

    /// Overlay the fields present in `update` onto this entry.
    ///
    /// Fields absent from `update` keep their current value.
    pub fn merged_with(&self, update: &Entry) -> Entry {
        Entry {
            version: ENTRY_VERSION,
            volume: update.volume.clone().or_else(|| self.volume.clone()),
            muted: update.muted.or(self.muted),
            device: update.device.clone().or_else(|| self.device.clone()),
            card: update.card.clone().or_else(|| self.card.clone()),
        }
    }
}

/// Device/card name check: non-empty, shorter than [`NAME_MAX`], and made of
/// ASCII letters, digits, `.`, `_` and `-` only.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() < NAME_MAX
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}
