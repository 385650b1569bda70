//! End-to-end behaviour of the restore subsystem against the in-memory graph

use stream_restore::core::{
    AudioCore, DeviceInfo, Direction, MemoryCore, PropertyList, StreamId, StreamInfo,
};
use stream_restore::identity::IDENTIFICATION_PROPERTY;
use stream_restore::mirror::MirrorSignal;
use stream_restore::protocol::{Connection, Reply, Request, RestoreRecord, UpdateMode};
use stream_restore::seed::SeedTable;
use stream_restore::tracker::{entries_equal, ExtensionEvent};
use stream_restore::volume::{CVolume, ChannelMap, ChannelPosition, VOLUME_NORM};
use stream_restore::{Entry, PreferenceStore, RestoreConfig, StreamRestore};
use tempfile::tempdir;

fn props(id: &str) -> PropertyList {
    let mut p = PropertyList::new();
    p.insert(IDENTIFICATION_PROPERTY.to_string(), id.to_string());
    p
}

fn record(name: &str, device: Option<&str>, volume: Option<u32>, muted: bool) -> RestoreRecord {
    let (channel_map, volume) = match volume {
        Some(v) => (ChannelMap::stereo(), CVolume::uniform(2, v)),
        None => (ChannelMap::default(), CVolume::default()),
    };
    RestoreRecord {
        name: name.to_string(),
        channel_map,
        volume,
        device: device.map(str::to_string),
        muted,
    }
}

fn init(store: PreferenceStore, core: &mut MemoryCore) -> StreamRestore {
    StreamRestore::init(store, &RestoreConfig::default(), &SeedTable::None, core).unwrap()
}

#[test]
fn test_write_then_read_applies_to_live_stream() {
    let mut core = MemoryCore::new();
    core.add_device(DeviceInfo::new("speakers", Direction::Playback, None));
    core.add_device(DeviceInfo::new("usb", Direction::Playback, None));
    let id = StreamId::playback(7);
    core.add_stream(StreamInfo::new(id, props("alice"), Some("speakers")));

    let mut restore = init(PreferenceStore::temporary().unwrap(), &mut core);
    let (conn, _events) = Connection::new(1, "test-client");

    let write = Request::Write {
        mode: UpdateMode::Merge,
        apply_immediately: true,
        records: vec![record("alice", Some("usb"), Some(VOLUME_NORM / 2), true)],
    };
    let reply = restore
        .handle_extension(&mut core, &conn, &write.encode())
        .unwrap();
    assert_eq!(reply, Reply::Ack.encode());

    let reply = restore
        .handle_extension(&mut core, &conn, &Request::Read.encode())
        .unwrap();
    let records = Reply::decode_entries(&reply).unwrap();
    assert_eq!(
        records,
        vec![record("alice", Some("usb"), Some(VOLUME_NORM / 2), true)]
    );

    let stream = core.get(id).unwrap();
    assert_eq!(stream.device.as_deref(), Some("usb"));
    assert_eq!(stream.volume, CVolume::uniform(2, VOLUME_NORM / 2));
    assert!(stream.muted);
    restore.shutdown();
}

#[test]
fn test_corrupt_record_removed_at_startup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stream-volumes");
    {
        let store = PreferenceStore::open(&path).unwrap();
        store.set("bob", b"garbage", true).unwrap();
        let mut alice = Entry::new();
        alice.muted = Some(false);
        store.write_entry("alice", &alice, true);
        store.flush().unwrap();
    }

    let mut core = MemoryCore::new();
    let restore = init(PreferenceStore::open(&path).unwrap(), &mut core);
    assert!(!restore.store().contains("bob"));
    assert!(restore.store().contains("alice"));
    assert!(restore.get_entry_by_name("bob").is_err());
    assert!(restore.get_entry_by_name("alice").is_ok());
}

#[test]
fn test_rescue_on_device_removal() {
    let mut core = MemoryCore::new();
    core.add_device(DeviceInfo::new("speakers", Direction::Playback, None));
    core.add_device(DeviceInfo::new("bt-headset", Direction::Playback, None));

    let a = StreamId::playback(1);
    let b = StreamId::playback(2);
    core.add_stream(StreamInfo::new(a, props("a"), Some("bt-headset")));
    let mut stream_b = StreamInfo::new(b, props("b"), Some("bt-headset"));
    stream_b.save_device = true;
    core.add_stream(stream_b);

    let store = PreferenceStore::temporary().unwrap();
    let mut remembers_speakers = Entry::new();
    remembers_speakers.device = Some("speakers".into());
    store.write_entry("a", &remembers_speakers, true);
    let mut remembers_absent = Entry::new();
    remembers_absent.device = Some("usb-dac".into());
    store.write_entry("b", &remembers_absent, true);

    let mut restore = StreamRestore::new(
        store,
        RestoreConfig::default().options(),
        RestoreConfig::default().save_interval(),
    );
    let Some(headset) = core.device(Direction::Playback, "bt-headset") else {
        panic!("headset missing");
    };
    restore.on_device_removed(&mut core, &headset);
    core.unlink_device(Direction::Playback, "bt-headset");

    assert_eq!(core.get(a).unwrap().device.as_deref(), Some("speakers"));
    assert_eq!(core.moves, vec![(a, "speakers".to_string())]);

    let stream_b = core.get(b).unwrap();
    assert!(!stream_b.save_device);
    assert_eq!(core.changes_posted, vec![b]);
}

#[test]
fn test_rescue_skipped_during_shutdown() {
    let mut core = MemoryCore::new();
    core.add_device(DeviceInfo::new("speakers", Direction::Playback, None));
    core.add_device(DeviceInfo::new("bt-headset", Direction::Playback, None));
    let a = StreamId::playback(1);
    core.add_stream(StreamInfo::new(a, props("a"), Some("bt-headset")));

    let store = PreferenceStore::temporary().unwrap();
    let mut entry = Entry::new();
    entry.device = Some("speakers".into());
    store.write_entry("a", &entry, true);

    let mut restore = init(store, &mut core);
    core.shutting_down = true;
    let headset = DeviceInfo::new("bt-headset", Direction::Playback, None);
    restore.on_device_removed(&mut core, &headset);
    assert!(core.moves.is_empty());
}

#[test]
fn test_object_model_update_modes() {
    let mut core = MemoryCore::new();
    let mut restore = init(PreferenceStore::temporary().unwrap(), &mut core);

    restore
        .write_records(
            &mut core,
            UpdateMode::Merge,
            false,
            &[record("alice", Some("usb"), Some(VOLUME_NORM), false)],
        )
        .unwrap();
    restore
        .write_records(
            &mut core,
            UpdateMode::Merge,
            false,
            &[record("alice", None, None, true)],
        )
        .unwrap();

    let path = restore.get_entry_by_name("alice").unwrap();
    let props = restore.entry_properties(&path).unwrap();
    assert_eq!(props.device, "usb");
    assert_eq!(props.volume, vec![(1, VOLUME_NORM), (2, VOLUME_NORM)]);
    assert!(props.mute);

    restore
        .write_records(
            &mut core,
            UpdateMode::Replace,
            false,
            &[record("alice", None, None, false)],
        )
        .unwrap();
    let props = restore.entry_properties(&path).unwrap();
    assert_eq!(props.device, "");
    assert!(props.volume.is_empty());
    assert!(!props.mute);

    restore
        .write_records(
            &mut core,
            UpdateMode::Set,
            false,
            &[record("bob", None, None, true)],
        )
        .unwrap();
    assert!(restore.get_entry_by_name("alice").is_err());
    assert!(restore.get_entry_by_name("bob").is_ok());
    assert_eq!(restore.store().keys(), vec!["bob".to_string()]);
}

#[test]
fn test_invalid_record_stops_batch() {
    let mut core = MemoryCore::new();
    let mut restore = init(PreferenceStore::temporary().unwrap(), &mut core);

    let mut bad = record("bad", None, None, false);
    bad.channel_map = ChannelMap::new(vec![ChannelPosition::Mono]);
    bad.volume = CVolume::uniform(2, VOLUME_NORM);

    let result = restore.write_records(
        &mut core,
        UpdateMode::Merge,
        false,
        &[
            record("first", None, None, true),
            bad,
            record("last", None, None, true),
        ],
    );
    assert!(result.is_err());
    assert!(restore.store().contains("first"));
    assert!(!restore.store().contains("bad"));
    assert!(!restore.store().contains("last"));
}

#[test]
fn test_delete_of_absent_key_is_silent() {
    let mut core = MemoryCore::new();
    let mut restore = init(PreferenceStore::temporary().unwrap(), &mut core);
    let (conn, mut events) = Connection::new(3, "test-client");
    let mut signals = restore.subscribe_signals();

    restore
        .handle_request(&mut core, &conn, Request::Subscribe { enabled: true })
        .unwrap();
    restore
        .handle_request(
            &mut core,
            &conn,
            Request::Delete {
                names: vec!["nobody".into()],
            },
        )
        .unwrap();

    assert!(signals.try_recv().is_err());
    assert!(events.try_recv().is_err());
}

#[test]
fn test_equal_write_is_not_a_change() {
    let mut core = MemoryCore::new();
    let mut restore = init(PreferenceStore::temporary().unwrap(), &mut core);
    let (conn, mut events) = Connection::new(4, "test-client");
    restore
        .handle_request(&mut core, &conn, Request::Subscribe { enabled: true })
        .unwrap();

    let alice = record("alice", Some("usb"), Some(VOLUME_NORM), true);
    assert_eq!(
        restore
            .write_records(&mut core, UpdateMode::Replace, false, &[alice.clone()])
            .unwrap(),
        1
    );
    assert_eq!(events.try_recv().unwrap(), ExtensionEvent::Changed);

    let mut signals = restore.subscribe_signals();
    assert_eq!(
        restore
            .write_records(&mut core, UpdateMode::Replace, false, &[alice.clone()])
            .unwrap(),
        0
    );
    assert!(events.try_recv().is_err());
    assert!(signals.try_recv().is_err());

    let entry = alice.to_entry().unwrap();
    assert!(entries_equal(&entry, &entry));
}

#[test]
fn test_stream_changes_are_remembered() {
    let mut core = MemoryCore::new();
    core.add_device(DeviceInfo::new("speakers", Direction::Playback, None));
    let mut restore = init(PreferenceStore::temporary().unwrap(), &mut core);
    let mut signals = restore.subscribe_signals();

    let mut stream = StreamInfo::new(StreamId::playback(9), props("carol"), Some("speakers"));
    stream.muted = true;
    stream.save_muted = true;
    stream.save_device = true;
    restore.observe_stream(&core, &stream);

    let entry = restore.store().read_entry("carol").unwrap();
    assert_eq!(entry.muted, Some(true));
    assert_eq!(entry.device.as_deref(), Some("speakers"));
    assert!(matches!(signals.try_recv().unwrap(), MirrorSignal::NewEntry { .. }));

    // Same state again: nothing new
    restore.observe_stream(&core, &stream);
    assert!(signals.try_recv().is_err());
}
