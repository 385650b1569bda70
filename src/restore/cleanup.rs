//! Startup maintenance: invalid record cleanup and the fallback table

use super::StreamRestore;
use crate::entry::{Entry, EntryCodec};
use crate::error::MalformedRecord;
use crate::seed::{self, SeedTable};
use crate::volume::{volume_from_db, CVolume, ChannelMap};
use tracing::{debug, info};

/// Keys touched by [`StreamRestore::clean_up_store`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Legacy records rewritten in the current layout
    pub migrated: Vec<String>,
    /// Records that could not be decoded and were deleted
    pub removed: Vec<String>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.migrated.is_empty() && self.removed.is_empty()
    }
}

impl StreamRestore {
    /// Migrate legacy records and delete everything else that fails to decode
    pub fn clean_up_store(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for (key, data) in self.store.iterate() {
            let error = match EntryCodec::decode(&data) {
                Ok(_) => continue,
                Err(e) => e,
            };

            if let MalformedRecord::LegacyLayout(version) = error {
                match EntryCodec::decode_legacy(&data) {
                    Ok(entry) => {
                        if self.store.write_entry(&key, &entry, true) {
                            info!("Migrated version {} entry with key {:?}", version, key);
                            report.migrated.push(key);
                            self.tracker.trigger_save();
                        }
                        continue;
                    }
                    Err(e) => debug!("Legacy entry {:?} is unreadable: {}", key, e),
                }
            } else {
                debug!("Entry {:?} is invalid: {}", key, error);
            }

            info!("Removing invalid entry with key {:?}", key);
            self.store.unset(&key);
            self.mirror.remove(&key);
            report.removed.push(key);
            self.tracker.trigger_save();
        }

        report
    }

    /// Insert the fallback table's volumes for keys that have no entry yet.
    ///
    /// Returns the number of entries added. A configured table that cannot
    /// be read, or a malformed table, is an error.
    pub fn load_seed_table(&mut self, table: &SeedTable) -> anyhow::Result<usize> {
        let (path, required) = match table {
            SeedTable::None => return Ok(0),
            SeedTable::Optional(path) => (path, false),
            SeedTable::Required(path) => (path, true),
        };

        let Some(records) = seed::load_table(path, required)? else {
            debug!("No fallback table at {}", path.display());
            return Ok(0);
        };

        let mut added = 0;
        for record in &records {
            if self.seed_entry(&record.name, record.db) {
                debug!("Setting volume of {:?} to {} dB", record.name, record.db);
                added += 1;
            }
        }
        if added > 0 {
            self.tracker.trigger_save();
        }

        info!(
            "Loaded {} of {} fallback volumes from {}",
            added,
            records.len(),
            path.display()
        );
        Ok(added)
    }

    /// Mono volume-only entry for `name`, unless one is stored already
    pub fn seed_entry(&mut self, name: &str, db: f64) -> bool {
        let mut entry = Entry::new();
        entry.set_volume(ChannelMap::mono(), CVolume::new(vec![volume_from_db(db)]));

        let written = self.store.write_entry(name, &entry, false);
        if written {
            self.mirror.ensure(name);
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RestoreOptions;
    use crate::store::PreferenceStore;
    use crate::volume::VOLUME_NORM;
    use std::io::Write;
    use std::time::Duration;

    fn restore() -> StreamRestore {
        StreamRestore::new(
            PreferenceStore::temporary().unwrap(),
            RestoreOptions::default(),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_cleanup_removes_corrupt_records() {
        let mut r = restore();
        r.store().set("bob", b"\x42\x02\x31", true).unwrap();
        let mut good = Entry::new();
        good.muted = Some(true);
        r.store().write_entry("alice", &good, true);

        let report = r.clean_up_store();
        assert_eq!(report.removed, vec!["bob".to_string()]);
        assert!(report.migrated.is_empty());
        assert!(r.store().contains("alice"));
        assert!(!r.store().contains("bob"));
        assert!(r.clean_up_store().is_empty());
    }

    #[test]
    fn test_seed_does_not_clobber() {
        let mut r = restore();
        let mut existing = Entry::new();
        existing.muted = Some(true);
        r.store().write_entry("alice", &existing, true);

        assert!(!r.seed_entry("alice", -10.0));
        assert_eq!(r.store().read_entry("alice").unwrap(), existing);

        assert!(r.seed_entry("bob", 0.0));
        let bob = r.store().read_entry("bob").unwrap();
        assert_eq!(bob.volume.unwrap().volume, CVolume::new(vec![VOLUME_NORM]));
        assert_eq!(bob.muted, None);
        assert!(r.mirror().contains("bob"));
    }

    #[test]
    fn test_seed_table_sources() {
        let mut r = restore();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.table");
        assert_eq!(r.load_seed_table(&SeedTable::Optional(missing.clone())).unwrap(), 0);
        assert!(r.load_seed_table(&SeedTable::Required(missing)).is_err());

        let path = dir.path().join("volumes.table");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# comment\nalice -6\nbob 6").unwrap();
        assert_eq!(r.load_seed_table(&SeedTable::Required(path)).unwrap(), 1);
        assert!(r.store().contains("alice"));
        assert!(!r.store().contains("bob"));
    }
}
