//! stream-restore - persistent per-stream volume, mute and device preferences
//!
//! Streams are grouped by a derived identity ([`identity`]). For each group
//! the last volume, mute state and device chosen by the user are kept in a
//! sled database ([`store`]), restored when a matching stream appears
//! ([`engine`]), and exposed to control clients through an extension command
//! set ([`protocol`]) and an object-model surface ([`mirror`]).
//! [`restore::StreamRestore`] owns all of it.

pub mod config;
pub mod core;
pub mod engine;
pub mod entry;
pub mod error;
pub mod identity;
pub mod mirror;
pub mod paths;
pub mod protocol;
pub mod restore;
pub mod seed;
pub mod store;
pub mod tagstruct;
pub mod tracker;
pub mod volume;

pub use crate::config::RestoreConfig;
pub use crate::engine::{RestoreEngine, RestoreOptions};
pub use crate::entry::{Entry, EntryCodec};
pub use crate::error::{MalformedRecord, RestoreError, StoreError};
pub use crate::restore::StreamRestore;
pub use crate::store::PreferenceStore;
