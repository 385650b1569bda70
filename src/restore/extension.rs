//! Extension command handling

use super::StreamRestore;
use crate::core::AudioCore;
use crate::entry::EntryCodec;
use crate::error::RestoreError;
use crate::protocol::{Connection, Reply, Request, RestoreRecord, UpdateMode, EXTENSION_VERSION};
use crate::tracker::{entries_equal, ConnectionId};
use tracing::{debug, warn};

impl StreamRestore {
    /// Parse and run one request payload, returning the reply payload.
    ///
    /// A parse error fails only this request; the connection stays usable.
    pub fn handle_extension(
        &mut self,
        core: &mut dyn AudioCore,
        conn: &Connection,
        payload: &[u8],
    ) -> Result<Vec<u8>, RestoreError> {
        let request = Request::decode(payload).map_err(|e| {
            warn!("Protocol error from {}: {}", conn.client(), e);
            e
        })?;
        Ok(self.handle_request(core, conn, request)?.encode())
    }

    pub fn handle_request(
        &mut self,
        core: &mut dyn AudioCore,
        conn: &Connection,
        request: Request,
    ) -> Result<Reply, RestoreError> {
        match request {
            Request::Test => Ok(Reply::Version(EXTENSION_VERSION)),
            Request::Read => Ok(Reply::Entries(self.read_records())),
            Request::Write {
                mode,
                apply_immediately,
                records,
            } => {
                self.write_records(core, mode, apply_immediately, &records)?;
                Ok(Reply::Ack)
            }
            Request::Delete { names } => {
                self.delete_records(&names);
                Ok(Reply::Ack)
            }
            Request::Subscribe { enabled } => {
                if enabled {
                    self.tracker.subscribe(conn.id(), conn.events());
                } else {
                    self.tracker.unsubscribe(conn.id());
                }
                Ok(Reply::Ack)
            }
        }
    }

    /// Every decodable entry, with neutral values for absent fields
    pub fn read_records(&self) -> Vec<RestoreRecord> {
        self.store
            .iterate()
            .into_iter()
            .filter_map(|(key, data)| match EntryCodec::decode(&data) {
                Ok(entry) => Some(RestoreRecord::from_entry(&key, &entry)),
                Err(e) => {
                    debug!("Skipping unreadable entry {:?}: {}", key, e);
                    None
                }
            })
            .collect()
    }

    /// Apply a `WRITE` batch.
    ///
    /// Records are processed in order. The first invalid record stops the
    /// batch and its error is returned; records before it stay committed and
    /// are announced and scheduled for saving like any other change.
    /// Returns the number of records that changed the store.
    pub fn write_records(
        &mut self,
        core: &mut dyn AudioCore,
        mode: UpdateMode,
        apply_immediately: bool,
        records: &[RestoreRecord],
    ) -> Result<usize, RestoreError> {
        let mut changed = false;
        if mode == UpdateMode::Set {
            changed = !self.store.is_empty();
            self.mirror.clear();
            self.store.clear_all();
        }

        let mut committed = 0;
        let mut failure = None;
        for record in records {
            match self.write_record(core, mode, apply_immediately, record) {
                Ok(true) => committed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Rejecting record {:?}: {}", record.name, e);
                    failure = Some(e);
                    break;
                }
            }
        }

        if changed || committed > 0 {
            self.tracker.trigger_save();
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(committed),
        }
    }

    fn write_record(
        &mut self,
        core: &mut dyn AudioCore,
        mode: UpdateMode,
        apply_immediately: bool,
        record: &RestoreRecord,
    ) -> Result<bool, RestoreError> {
        let incoming = record.to_entry()?;
        let name = record.name.as_str();

        let old = self.store.read_entry(name);
        let entry = match (&old, mode) {
            (Some(old), UpdateMode::Merge) => old.merged_with(&incoming),
            _ => incoming,
        };

        let unchanged = old.as_ref().is_some_and(|old| entries_equal(old, &entry));
        if !unchanged {
            self.commit(name, &entry)?;
            self.announce(name, old.as_ref(), &entry);
        }

        if apply_immediately {
            self.engine.apply(core, name, &entry);
        }

        Ok(!unchanged)
    }

    /// Remove entries by key; absent keys are ignored
    pub fn delete_records(&mut self, names: &[String]) -> usize {
        let mut removed = 0;
        for name in names {
            let mirrored = self.mirror.remove(name);
            let stored = self.store.unset(name);
            if mirrored || stored {
                removed += 1;
            }
        }
        if removed > 0 {
            self.tracker.trigger_save();
        }
        removed
    }

    /// The connection went away; forget its subscription
    pub fn connection_closed(&mut self, id: ConnectionId) {
        self.tracker.unsubscribe(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryCore;
    use crate::engine::RestoreOptions;
    use crate::error::{InvalidEntry, ProtocolError};
    use crate::mirror::MirrorSignal;
    use crate::protocol::Subcommand;
    use crate::store::PreferenceStore;
    use crate::tagstruct::TagWriter;
    use crate::tracker::ExtensionEvent;
    use crate::volume::{CVolume, ChannelMap, VOLUME_NORM};
    use std::time::Duration;

    fn restore() -> StreamRestore {
        StreamRestore::new(
            PreferenceStore::temporary().unwrap(),
            RestoreOptions::default(),
            Duration::from_secs(10),
        )
    }

    fn record(name: &str, device: Option<&str>, muted: bool) -> RestoreRecord {
        RestoreRecord {
            name: name.into(),
            channel_map: ChannelMap::stereo(),
            volume: CVolume::uniform(2, VOLUME_NORM),
            device: device.map(str::to_owned),
            muted,
        }
    }

    fn write(r: &mut StreamRestore, mode: UpdateMode, records: Vec<RestoreRecord>) -> Result<usize, RestoreError> {
        let mut core = MemoryCore::new();
        r.write_records(&mut core, mode, false, &records)
    }

    #[test]
    fn test_test_command_reports_version() {
        let mut r = restore();
        let mut core = MemoryCore::new();
        let (conn, _rx) = Connection::new(1, "test");
        let reply = r.handle_request(&mut core, &conn, Request::Test).unwrap();
        assert_eq!(reply, Reply::Version(1));
    }

    #[test]
    fn test_merge_keeps_fields_missing_from_record() {
        let mut r = restore();
        write(&mut r, UpdateMode::Replace, vec![record("alice", Some("usb"), false)]).unwrap();

        let mut no_device = record("alice", None, true);
        no_device.volume = CVolume::default();
        write(&mut r, UpdateMode::Merge, vec![no_device]).unwrap();

        let e = r.store().read_entry("alice").unwrap();
        assert_eq!(e.device.as_deref(), Some("usb"));
        assert_eq!(e.muted, Some(true));
        assert!(e.volume.is_some());
    }

    #[test]
    fn test_replace_overwrites_whole_record() {
        let mut r = restore();
        write(&mut r, UpdateMode::Replace, vec![record("alice", Some("usb"), false)]).unwrap();
        write(&mut r, UpdateMode::Replace, vec![record("alice", None, true)]).unwrap();
        let e = r.store().read_entry("alice").unwrap();
        assert_eq!(e.device, None);
        assert_eq!(e.muted, Some(true));
    }

    #[test]
    fn test_set_leaves_exactly_the_batch() {
        let mut r = restore();
        write(
            &mut r,
            UpdateMode::Replace,
            vec![record("alice", None, false), record("bob", None, false)],
        )
        .unwrap();
        let mut signals = r.subscribe_signals();

        write(&mut r, UpdateMode::Set, vec![record("carol", None, false)]).unwrap();
        assert_eq!(r.store().keys(), vec!["carol".to_string()]);
        assert_eq!(r.mirror().len(), 1);

        let mut removed = 0;
        let mut added = 0;
        while let Ok(signal) = signals.try_recv() {
            match signal {
                MirrorSignal::EntryRemoved { .. } => removed += 1,
                MirrorSignal::NewEntry { .. } => added += 1,
                other => panic!("unexpected signal {:?}", other),
            }
        }
        assert_eq!((removed, added), (2, 1));
    }

    #[test]
    fn test_set_on_empty_store_with_empty_batch_is_not_a_change() {
        let mut r = restore();
        let mut core = MemoryCore::new();
        let (conn, mut rx) = Connection::new(2, "test");
        r.handle_request(&mut core, &conn, Request::Subscribe { enabled: true })
            .unwrap();

        assert_eq!(write(&mut r, UpdateMode::Set, vec![]).unwrap(), 0);
        assert!(rx.try_recv().is_err());

        write(&mut r, UpdateMode::Replace, vec![record("alice", None, false)]).unwrap();
        assert_eq!(rx.try_recv(), Ok(ExtensionEvent::Changed));
        assert_eq!(write(&mut r, UpdateMode::Set, vec![]).unwrap(), 0);
        assert_eq!(rx.try_recv(), Ok(ExtensionEvent::Changed));
        assert!(r.store().is_empty());
    }

    #[test]
    fn test_invalid_record_aborts_rest_of_batch() {
        let mut r = restore();
        let mut bad = record("bob", None, false);
        bad.volume = CVolume::uniform(3, VOLUME_NORM);

        let result = write(
            &mut r,
            UpdateMode::Replace,
            vec![record("alice", None, false), bad, record("carol", None, false)],
        );
        assert!(matches!(
            result,
            Err(RestoreError::Invalid(InvalidEntry::IncompatibleVolume { .. }))
        ));
        // earlier records stay committed
        assert!(r.store().contains("alice"));
        assert!(!r.store().contains("bob"));
        assert!(!r.store().contains("carol"));
        assert!(r.mirror().contains("alice"));
    }

    #[test]
    fn test_rewrite_of_equal_record_is_silent() {
        let mut r = restore();
        write(&mut r, UpdateMode::Replace, vec![record("alice", Some("usb"), false)]).unwrap();
        let mut signals = r.subscribe_signals();
        let changed = write(&mut r, UpdateMode::Replace, vec![record("alice", Some("usb"), false)]).unwrap();
        assert_eq!(changed, 0);
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_write_existing_emits_field_signals() {
        let mut r = restore();
        write(&mut r, UpdateMode::Replace, vec![record("alice", Some("usb"), false)]).unwrap();
        let mut signals = r.subscribe_signals();
        write(&mut r, UpdateMode::Replace, vec![record("alice", Some("hdmi"), false)]).unwrap();
        assert!(matches!(
            signals.try_recv(),
            Ok(MirrorSignal::DeviceUpdated { device, .. }) if device == "hdmi"
        ));
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let mut r = restore();
        let mut signals = r.subscribe_signals();
        assert_eq!(r.delete_records(&["nobody".to_string()]), 0);
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_delete_removes_and_signals() {
        let mut r = restore();
        write(&mut r, UpdateMode::Replace, vec![record("alice", None, false)]).unwrap();
        let path = r.mirror().get("alice").unwrap().object_path.clone();
        let mut signals = r.subscribe_signals();
        assert_eq!(r.delete_records(&["alice".to_string()]), 1);
        assert!(!r.store().contains("alice"));
        assert_eq!(signals.try_recv().unwrap(), MirrorSignal::EntryRemoved { path });
    }

    #[test]
    fn test_parse_error_keeps_state() {
        let mut r = restore();
        let mut core = MemoryCore::new();
        let (conn, _rx) = Connection::new(1, "test");
        let mut w = TagWriter::new();
        w.put_u32(Subcommand::Read as u32).put_bool(true);
        let err = r.handle_extension(&mut core, &conn, &w.into_vec()).unwrap_err();
        assert!(matches!(err, RestoreError::Protocol(ProtocolError::TrailingData)));

        let reply = r
            .handle_extension(&mut core, &conn, &Request::Test.encode())
            .unwrap();
        assert_eq!(reply, Reply::Version(1).encode());
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let mut r = restore();
        let mut core = MemoryCore::new();
        let (conn, mut rx) = Connection::new(9, "pavucontrol");

        r.handle_request(&mut core, &conn, Request::Subscribe { enabled: true })
            .unwrap();
        r.write_records(&mut core, UpdateMode::Replace, false, &[record("alice", None, false)])
            .unwrap();
        assert_eq!(rx.try_recv(), Ok(ExtensionEvent::Changed));

        r.connection_closed(conn.id());
        assert!(!r.tracker().is_subscribed(9));
        r.delete_records(&["alice".to_string()]);
        assert!(rx.try_recv().is_err());
    }
}
