use crate::error::Result;
use crate::models::VersionRecord;
use crate::store::{read_json, write_json, Store, HOLD_KEY, VERSION_KEY};

/// Id scheme version written by the current migration.
pub const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    Absent,
    Stale(u32),
    Current,
}

impl VersionState {
    pub fn needs_migration(&self) -> bool {
        !matches!(self, Self::Current)
    }
}

pub struct VersionLedger<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> VersionLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The stored record, or `None` when missing or unreadable.
    pub fn get_version(&self) -> Option<VersionRecord> {
        match read_json::<VersionRecord>(self.store, VERSION_KEY) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Ignoring unreadable version record: {e}");
                None
            }
        }
    }

    pub fn set_version(&self, record: &VersionRecord) -> Result<()> {
        write_json(self.store, VERSION_KEY, record)
    }

    pub fn state(&self) -> VersionState {
        match self.get_version() {
            None => VersionState::Absent,
            Some(r) if r.version < CURRENT_VERSION => VersionState::Stale(r.version),
            Some(_) => VersionState::Current,
        }
    }

    pub fn needs_migration(&self) -> bool {
        self.state().needs_migration()
    }

    pub fn reset(&self) -> Result<()> {
        self.store.remove(VERSION_KEY)
    }

    /// Whether the data was restored from a backup and is waiting for an
    /// explicit forced migration.
    pub fn is_held(&self) -> bool {
        match self.store.get(HOLD_KEY) {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::warn!("Could not read restore hold: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::MemoryStore;

    fn record(version: u32) -> VersionRecord {
        VersionRecord {
            version,
            migrated_at: Utc::now(),
            previous_version: None,
        }
    }

    #[test]
    fn test_absent_needs_migration() {
        let store = MemoryStore::new();
        let ledger = VersionLedger::new(&store);
        assert_eq!(ledger.state(), VersionState::Absent);
        assert!(ledger.needs_migration());
        assert!(ledger.get_version().is_none());
    }

    #[test]
    fn test_stale_needs_migration() {
        let store = MemoryStore::new();
        let ledger = VersionLedger::new(&store);
        ledger.set_version(&record(1)).unwrap();
        assert_eq!(ledger.state(), VersionState::Stale(1));
        assert!(ledger.needs_migration());
    }

    #[test]
    fn test_current_does_not_need_migration() {
        let store = MemoryStore::new();
        let ledger = VersionLedger::new(&store);
        ledger.set_version(&record(CURRENT_VERSION)).unwrap();
        assert_eq!(ledger.state(), VersionState::Current);
        assert!(!ledger.needs_migration());
    }

    #[test]
    fn test_corrupted_record_is_absent() {
        let store = MemoryStore::new();
        store.set(VERSION_KEY, "{\"version\": \"two\"").unwrap();
        let ledger = VersionLedger::new(&store);
        assert_eq!(ledger.state(), VersionState::Absent);
        assert!(ledger.needs_migration());
    }

    #[test]
    fn test_hold_flag() {
        let store = MemoryStore::new();
        let ledger = VersionLedger::new(&store);
        assert!(!ledger.is_held());
        store.set(HOLD_KEY, "\"2024-01-01T00:00:00Z\"").unwrap();
        assert!(ledger.is_held());
    }

    #[test]
    fn test_reset_removes_record() {
        let store = MemoryStore::new();
        let ledger = VersionLedger::new(&store);
        ledger.set_version(&record(CURRENT_VERSION)).unwrap();
        ledger.reset().unwrap();
        assert_eq!(ledger.state(), VersionState::Absent);
    }
}
