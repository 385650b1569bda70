//! Extension command set carried over an existing client connection
//!
//! A request is `u32 command` followed by its arguments, all in the tagged
//! encoding of [`crate::tagstruct`]. Replies carry only the payload; framing
//! and tagging of the reply packet belong to the transport.

use crate::entry::{is_valid_name, Entry, StoredVolume};
use crate::error::{InvalidEntry, ProtocolError, RestoreError, TagError};
use crate::tagstruct::{TagReader, TagWriter};
use crate::tracker::{ConnectionId, ExtensionEvent};
use crate::volume::{CVolume, ChannelMap};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const EXTENSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Subcommand {
    Test = 0,
    Read = 1,
    Write = 2,
    Delete = 3,
    Subscribe = 4,
    Event = 5,
}

impl TryFrom<u32> for Subcommand {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Subcommand::Test,
            1 => Subcommand::Read,
            2 => Subcommand::Write,
            3 => Subcommand::Delete,
            4 => Subcommand::Subscribe,
            5 => Subcommand::Event,
            other => return Err(ProtocolError::UnknownCommand(other)),
        })
    }
}

/// How a `WRITE` batch combines with what is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Clear the whole store first
    Set,
    /// Keep stored fields the record leaves out
    Merge,
    /// Overwrite stored records entirely
    Replace,
}

impl UpdateMode {
    fn to_raw(self) -> u32 {
        match self {
            UpdateMode::Set => 0,
            UpdateMode::Merge => 1,
            UpdateMode::Replace => 2,
        }
    }

    fn from_raw(raw: u32) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(UpdateMode::Set),
            1 => Ok(UpdateMode::Merge),
            2 => Ok(UpdateMode::Replace),
            other => Err(ProtocolError::UnknownMode(other)),
        }
    }
}

/// One entry as exchanged by `READ` and `WRITE`.
///
/// Absent fields travel as neutral values: an empty channel map and volume,
/// no device, not muted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRecord {
    pub name: String,
    pub channel_map: ChannelMap,
    pub volume: CVolume,
    pub device: Option<String>,
    pub muted: bool,
}

impl RestoreRecord {
    pub fn from_entry(name: &str, entry: &Entry) -> Self {
        let (channel_map, volume) = match &entry.volume {
            Some(v) => (v.channel_map.clone(), v.volume.clone()),
            None => (ChannelMap::default(), CVolume::default()),
        };
        Self {
            name: name.to_owned(),
            channel_map,
            volume,
            device: entry.device.clone(),
            muted: entry.muted.unwrap_or(false),
        }
    }

    /// Validate the record and turn it into the entry to store
    pub fn to_entry(&self) -> Result<Entry, RestoreError> {
        if self.name.is_empty() {
            return Err(RestoreError::EmptyName);
        }

        let mut entry = Entry::new();

        if self.volume.channels() > 0 {
            let stored = StoredVolume {
                channel_map: self.channel_map.clone(),
                volume: self.volume.clone(),
            };
            stored.validate()?;
            entry.volume = Some(stored);
        }

        entry.muted = Some(self.muted);

        if let Some(device) = self.device.as_deref().filter(|d| !d.is_empty()) {
            if !is_valid_name(device) {
                return Err(InvalidEntry::InvalidName(device.to_owned()).into());
            }
            entry.device = Some(device.to_owned());
        }

        Ok(entry)
    }

    fn write(&self, w: &mut TagWriter) {
        w.put_string(&self.name)
            .put_channel_map(&self.channel_map)
            .put_cvolume(&self.volume)
            .put_opt_string(self.device.as_deref())
            .put_bool(self.muted);
    }

    fn read(r: &mut TagReader<'_>) -> Result<Self, TagError> {
        Ok(Self {
            name: r.get_opt_string()?.unwrap_or_default(),
            channel_map: r.get_channel_map()?,
            volume: r.get_cvolume()?,
            device: r.get_opt_string()?,
            muted: r.get_bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Test,
    Read,
    Write {
        mode: UpdateMode,
        apply_immediately: bool,
        records: Vec<RestoreRecord>,
    },
    Delete {
        names: Vec<String>,
    },
    Subscribe {
        enabled: bool,
    },
}

impl Request {
    /// Parse a complete request payload
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = TagReader::new(payload);
        let command = Subcommand::try_from(r.get_u32()?)?;

        let request = match command {
            Subcommand::Test => Request::Test,
            Subcommand::Read => Request::Read,
            Subcommand::Write => {
                let mode = UpdateMode::from_raw(r.get_u32()?)?;
                let apply_immediately = r.get_bool()?;
                let mut records = Vec::new();
                while !r.is_eof() {
                    records.push(RestoreRecord::read(&mut r)?);
                }
                Request::Write {
                    mode,
                    apply_immediately,
                    records,
                }
            }
            Subcommand::Delete => {
                let mut names = Vec::new();
                while !r.is_eof() {
                    names.push(r.get_opt_string()?.unwrap_or_default());
                }
                Request::Delete { names }
            }
            Subcommand::Subscribe => Request::Subscribe {
                enabled: r.get_bool()?,
            },
            // Events flow from server to client only
            Subcommand::Event => return Err(ProtocolError::UnknownCommand(Subcommand::Event as u32)),
        };

        if !r.is_eof() {
            return Err(ProtocolError::TrailingData);
        }
        Ok(request)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = TagWriter::new();
        match self {
            Request::Test => {
                w.put_u32(Subcommand::Test as u32);
            }
            Request::Read => {
                w.put_u32(Subcommand::Read as u32);
            }
            Request::Write {
                mode,
                apply_immediately,
                records,
            } => {
                w.put_u32(Subcommand::Write as u32)
                    .put_u32(mode.to_raw())
                    .put_bool(*apply_immediately);
                for record in records {
                    record.write(&mut w);
                }
            }
            Request::Delete { names } => {
                w.put_u32(Subcommand::Delete as u32);
                for name in names {
                    w.put_string(name);
                }
            }
            Request::Subscribe { enabled } => {
                w.put_u32(Subcommand::Subscribe as u32).put_bool(*enabled);
            }
        }
        w.into_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer to `TEST`
    Version(u32),
    /// Answer to `READ`
    Entries(Vec<RestoreRecord>),
    /// Empty acknowledgement
    Ack,
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = TagWriter::new();
        match self {
            Reply::Version(v) => {
                w.put_u32(*v);
            }
            Reply::Entries(records) => {
                for record in records {
                    record.write(&mut w);
                }
            }
            Reply::Ack => {}
        }
        w.into_vec()
    }

    /// Client side: parse the payload of a `READ` reply
    pub fn decode_entries(payload: &[u8]) -> Result<Vec<RestoreRecord>, ProtocolError> {
        let mut r = TagReader::new(payload);
        let mut records = Vec::new();
        while !r.is_eof() {
            records.push(RestoreRecord::read(&mut r)?);
        }
        Ok(records)
    }
}

/// Payload of the unsolicited event sent to subscribed connections
pub fn encode_event(event: ExtensionEvent) -> Vec<u8> {
    let mut w = TagWriter::new();
    match event {
        ExtensionEvent::Changed => {
            w.put_u32(Subcommand::Event as u32);
        }
    }
    w.into_vec()
}

/// Client connection as seen by the extension
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    client: String,
    events: mpsc::UnboundedSender<ExtensionEvent>,
}

impl Connection {
    /// New connection plus the receiving end of its event queue
    pub fn new(id: ConnectionId, client: &str) -> (Self, mpsc::UnboundedReceiver<ExtensionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                client: client.to_owned(),
                events,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub(crate) fn events(&self) -> mpsc::UnboundedSender<ExtensionEvent> {
        self.events.clone()
    }
}
