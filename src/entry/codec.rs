//! Binary record layout for [`Entry`]
//!
//! Current layout (version 2):
//!
//! ```text
//! u8 version
//! bool has_volume   [channel_map cvolume]
//! bool has_muted    [bool muted]
//! bool has_device   [string device]
//! bool has_card     [string card]
//! ```
//!
//! Version 1 records always carry every payload, with nullable strings for
//! device and card. They are only read during the startup cleanup pass, which
//! rewrites them in the current layout.

use super::{Entry, StoredVolume, ENTRY_VERSION, LEGACY_ENTRY_VERSION};
use crate::error::{InvalidEntry, MalformedRecord};
use crate::tagstruct::{TagReader, TagWriter};

/// Encoder/decoder for stored preference records
pub struct EntryCodec;

impl EntryCodec {
    /// Encode in the current layout. The entry's own `version` field is
    /// ignored; records are always written at [`ENTRY_VERSION`].
    pub fn encode(entry: &Entry) -> Vec<u8> {
        let mut w = TagWriter::new();
        w.put_u8(ENTRY_VERSION);

        w.put_bool(entry.volume.is_some());
        if let Some(v) = &entry.volume {
            w.put_channel_map(&v.channel_map);
            w.put_cvolume(&v.volume);
        }

        w.put_bool(entry.muted.is_some());
        if let Some(muted) = entry.muted {
            w.put_bool(muted);
        }

        w.put_bool(entry.device.is_some());
        if let Some(device) = &entry.device {
            w.put_string(device);
        }

        w.put_bool(entry.card.is_some());
        if let Some(card) = &entry.card {
            w.put_string(card);
        }

        w.into_vec()
    }

    /// Decode a current-layout record and validate it
    pub fn decode(bytes: &[u8]) -> Result<Entry, MalformedRecord> {
        let mut r = TagReader::new(bytes);

        let version = r.get_u8()?;
        if version > ENTRY_VERSION {
            return Err(MalformedRecord::UnsupportedVersion(version));
        }
        if version < ENTRY_VERSION {
            return Err(MalformedRecord::LegacyLayout(version));
        }

        let mut entry = Entry::new();

        if r.get_bool()? {
            let channel_map = r.get_channel_map()?;
            let volume = r.get_cvolume()?;
            entry.volume = Some(StoredVolume {
                channel_map,
                volume,
            });
        }
        if r.get_bool()? {
            entry.muted = Some(r.get_bool()?);
        }
        if r.get_bool()? {
            entry.device = Some(r.get_string()?);
        }
        if r.get_bool()? {
            entry.card = Some(r.get_string()?);
        }

        Self::finish(&r, entry)
    }

    /// Decode a version 1 record. The result carries the current version so
    /// re-encoding it migrates the record.
    pub fn decode_legacy(bytes: &[u8]) -> Result<Entry, MalformedRecord> {
        let mut r = TagReader::new(bytes);

        let version = r.get_u8()?;
        if version != LEGACY_ENTRY_VERSION {
            return Err(MalformedRecord::UnsupportedVersion(version));
        }

        let volume_valid = r.get_bool()?;
        let channel_map = r.get_channel_map()?;
        let volume = r.get_cvolume()?;
        let muted_valid = r.get_bool()?;
        let muted = r.get_bool()?;
        let device_valid = r.get_bool()?;
        let device = r.get_opt_string()?;
        let card_valid = r.get_bool()?;
        let card = r.get_opt_string()?;

        let mut entry = Entry::new();
        if volume_valid {
            entry.volume = Some(StoredVolume {
                channel_map,
                volume,
            });
        }
        if muted_valid {
            entry.muted = Some(muted);
        }
        if device_valid {
            entry.device = Some(device.ok_or_else(|| InvalidEntry::InvalidName(String::new()))?);
        }
        if card_valid {
            entry.card = Some(card.ok_or_else(|| InvalidEntry::InvalidName(String::new()))?);
        }

        Self::finish(&r, entry)
    }

    fn finish(r: &TagReader<'_>, entry: Entry) -> Result<Entry, MalformedRecord> {
        if !r.is_eof() {
            return Err(MalformedRecord::TrailingBytes(r.remaining()));
        }
        entry.validate()?;
        Ok(entry)
    }
}
