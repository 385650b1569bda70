//! Tagged value encoding shared by stored records and extension messages
//!
//! Every value is preceded by a one-byte type tag. Integers are big-endian,
//! strings carry a u32 length prefix, channel maps and volumes carry a one-byte
//! channel count.

use crate::error::TagError;
use crate::volume::{CVolume, ChannelMap, ChannelPosition, CHANNELS_MAX};
use bytes::{Buf, BufMut, BytesMut};

pub const TAG_U8: u8 = b'B';
pub const TAG_U32: u8 = b'L';
pub const TAG_BOOLEAN_TRUE: u8 = b'1';
pub const TAG_BOOLEAN_FALSE: u8 = b'0';
pub const TAG_STRING: u8 = b't';
pub const TAG_STRING_NULL: u8 = b'N';
pub const TAG_CHANNEL_MAP: u8 = b'm';
pub const TAG_CVOLUME: u8 = b'v';

/// Append-only writer
#[derive(Debug, Default)]
pub struct TagWriter {
    buf: BytesMut,
}

impl TagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(TAG_U8);
        self.buf.put_u8(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u8(TAG_U32);
        self.buf.put_u32(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf
            .put_u8(if value { TAG_BOOLEAN_TRUE } else { TAG_BOOLEAN_FALSE });
        self
    }

    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u8(TAG_STRING);
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Nullable string
    pub fn put_opt_string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => self.put_string(s),
            None => {
                self.buf.put_u8(TAG_STRING_NULL);
                self
            }
        }
    }

    pub fn put_channel_map(&mut self, map: &ChannelMap) -> &mut Self {
        self.buf.put_u8(TAG_CHANNEL_MAP);
        self.buf.put_u8(map.channels() as u8);
        for pos in map.positions() {
            self.buf.put_u8(pos.to_raw());
        }
        self
    }

    pub fn put_cvolume(&mut self, volume: &CVolume) -> &mut Self {
        self.buf.put_u8(TAG_CVOLUME);
        self.buf.put_u8(volume.channels() as u8);
        for v in volume.values() {
            self.buf.put_u32(*v);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Cursor over an encoded buffer
#[derive(Debug, Clone)]
pub struct TagReader<'a> {
    buf: &'a [u8],
}

impl<'a> TagReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_eof(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, n: usize) -> Result<(), TagError> {
        if self.buf.remaining() < n {
            Err(TagError::Truncated {
                needed: n - self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    fn expect_tag(&mut self, expected: u8) -> Result<(), TagError> {
        self.need(1)?;
        let found = self.buf.get_u8();
        if found != expected {
            return Err(TagError::UnexpectedTag { expected, found });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, TagError> {
        self.expect_tag(TAG_U8)?;
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32, TagError> {
        self.expect_tag(TAG_U32)?;
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn get_bool(&mut self) -> Result<bool, TagError> {
        self.need(1)?;
        match self.buf.get_u8() {
            TAG_BOOLEAN_TRUE => Ok(true),
            TAG_BOOLEAN_FALSE => Ok(false),
            found => Err(TagError::UnexpectedTag {
                expected: TAG_BOOLEAN_TRUE,
                found,
            }),
        }
    }

    /// Nullable string
    pub fn get_opt_string(&mut self) -> Result<Option<String>, TagError> {
        self.need(1)?;
        match self.buf[0] {
            TAG_STRING_NULL => {
                self.buf.advance(1);
                Ok(None)
            }
            _ => self.get_string().map(Some),
        }
    }

    pub fn get_string(&mut self) -> Result<String, TagError> {
        self.expect_tag(TAG_STRING)?;
        self.need(4)?;
        let len = self.buf.get_u32() as usize;
        self.need(len)?;
        let s = std::str::from_utf8(&self.buf[..len])
            .map_err(|_| TagError::InvalidUtf8)?
            .to_owned();
        self.buf.advance(len);
        Ok(s)
    }

    pub fn get_channel_map(&mut self) -> Result<ChannelMap, TagError> {
        self.expect_tag(TAG_CHANNEL_MAP)?;
        let channels = self.get_count()?;
        let mut positions = Vec::with_capacity(channels);
        for _ in 0..channels {
            let raw = self.buf.get_u8();
            let pos = ChannelPosition::from_raw(raw as u32).ok_or(TagError::InvalidPosition(raw))?;
            positions.push(pos);
        }
        Ok(ChannelMap::new(positions))
    }

    pub fn get_cvolume(&mut self) -> Result<CVolume, TagError> {
        self.expect_tag(TAG_CVOLUME)?;
        let channels = self.get_count()?;
        self.need(channels * 4)?;
        let values = (0..channels).map(|_| self.buf.get_u32()).collect();
        Ok(CVolume::new(values))
    }

    // Channel count, then makes sure at least one byte per channel follows
    fn get_count(&mut self) -> Result<usize, TagError> {
        self.need(1)?;
        let channels = self.buf.get_u8() as usize;
        if channels > CHANNELS_MAX {
            return Err(TagError::TooManyChannels(channels));
        }
        self.need(channels)?;
        Ok(channels)
    }
}
