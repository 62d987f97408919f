use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, Result};
use crate::models::{Backup, Transaction, VersionRecord};
use crate::store::{
    json_op, read_json, write_json, Store, StoreOp, BACKUP_KEY, HOLD_KEY, TRANSACTIONS_KEY, VERSION_KEY,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreResult {
    pub success: bool,
    pub count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupInfo {
    pub exists: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub count: Option<usize>,
}

pub fn checksum(transactions: &[Transaction]) -> Result<String> {
    let json = serde_json::to_string(transactions)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub struct BackupManager<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> BackupManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Snapshot `transactions` into the single backup slot, tagged with the
    /// version currently on disk. Failure is logged and reported as `false`.
    pub fn create_backup(&self, transactions: &[Transaction], version: u32) -> bool {
        match self.write_backup(transactions, version) {
            Ok(()) => {
                tracing::info!("Backed up {} transactions (version {version})", transactions.len());
                true
            }
            Err(e) => {
                tracing::warn!("Backup failed, continuing without one: {e}");
                false
            }
        }
    }

    fn write_backup(&self, transactions: &[Transaction], version: u32) -> Result<()> {
        let backup = Backup {
            transactions: transactions.to_vec(),
            timestamp: Utc::now(),
            version,
            checksum: checksum(transactions)?,
        };
        write_json(self.store, BACKUP_KEY, &backup)
    }

    fn load(&self) -> Result<Backup> {
        let backup: Backup = read_json(self.store, BACKUP_KEY)?
            .ok_or_else(|| LedgerError::Other("No backup found".to_string()))?;
        if checksum(&backup.transactions)? != backup.checksum {
            return Err(LedgerError::Other(
                "Backup is corrupted (checksum mismatch)".to_string(),
            ));
        }
        Ok(backup)
    }

    /// Replace the transaction set and version marker with the backup in one
    /// batch. Nothing changes unless the whole backup is usable. The restored
    /// data is held back from automatic migration until a forced run.
    pub fn restore(&self) -> RestoreResult {
        let result = self.load().and_then(|backup| {
            let version_op = if backup.version == 0 {
                StoreOp::remove(VERSION_KEY)
            } else {
                json_op(
                    VERSION_KEY,
                    &VersionRecord {
                        version: backup.version,
                        migrated_at: backup.timestamp,
                        previous_version: None,
                    },
                )?
            };
            self.store.apply(&[
                json_op(TRANSACTIONS_KEY, &backup.transactions)?,
                version_op,
                json_op(HOLD_KEY, &Utc::now())?,
            ])?;
            Ok(backup.transactions.len())
        });

        match result {
            Ok(count) => {
                tracing::info!("Restored {count} transactions from backup");
                RestoreResult {
                    success: true,
                    count,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Restore failed: {e}");
                RestoreResult {
                    success: false,
                    count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn get_info(&self) -> BackupInfo {
        match read_json::<Backup>(self.store, BACKUP_KEY) {
            Ok(Some(backup)) => BackupInfo {
                exists: true,
                timestamp: Some(backup.timestamp),
                count: Some(backup.transactions.len()),
            },
            Ok(None) | Err(_) => BackupInfo {
                exists: false,
                timestamp: None,
                count: None,
            },
        }
    }

    pub fn discard(&self) -> Result<()> {
        self.store.remove(BACKUP_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{date, txn};
    use crate::store::MemoryStore;

    fn sample() -> Vec<Transaction> {
        vec![
            txn("strike-1", date(2024, 1, 1, 0, 0, 0)),
            txn("strike-2", date(2024, 1, 2, 0, 0, 0)),
        ]
    }

    #[test]
    fn test_create_and_info() {
        let store = MemoryStore::new();
        let backups = BackupManager::new(&store);
        assert!(!backups.get_info().exists);
        assert!(backups.create_backup(&sample(), 1));
        let info = backups.get_info();
        assert!(info.exists);
        assert_eq!(info.count, Some(2));
        assert!(info.timestamp.is_some());
    }

    #[test]
    fn test_create_failure_returns_false() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let backups = BackupManager::new(&store);
        assert!(!backups.create_backup(&sample(), 1));
    }

    #[test]
    fn test_restore_without_backup_leaves_data() {
        let store = MemoryStore::new();
        write_json(&store, TRANSACTIONS_KEY, &sample()).unwrap();
        let result = BackupManager::new(&store).restore();
        assert!(!result.success);
        assert_eq!(result.count, 0);
        assert!(result.error.unwrap().contains("No backup"));
        let current: Vec<Transaction> = read_json(&store, TRANSACTIONS_KEY).unwrap().unwrap();
        assert_eq!(current.len(), 2);
    }

    #[test]
    fn test_restore_replaces_data_and_version() {
        let store = MemoryStore::new();
        let backups = BackupManager::new(&store);
        backups.create_backup(&sample(), 1);
        write_json(&store, TRANSACTIONS_KEY, &vec![txn("other", date(2024, 2, 1, 0, 0, 0))]).unwrap();

        let result = backups.restore();
        assert!(result.success);
        assert_eq!(result.count, 2);
        let current: Vec<Transaction> = read_json(&store, TRANSACTIONS_KEY).unwrap().unwrap();
        assert_eq!(current, sample());
        let version: VersionRecord = read_json(&store, VERSION_KEY).unwrap().unwrap();
        assert_eq!(version.version, 1);
        assert!(store.get(HOLD_KEY).unwrap().is_some());
    }

    #[test]
    fn test_restore_version_zero_clears_marker() {
        let store = MemoryStore::new();
        let backups = BackupManager::new(&store);
        backups.create_backup(&sample(), 0);
        store.set(VERSION_KEY, "{}").unwrap();
        assert!(backups.restore().success);
        assert_eq!(store.get(VERSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_rejects_tampered_backup() {
        let store = MemoryStore::new();
        let backups = BackupManager::new(&store);
        backups.create_backup(&sample(), 1);
        let mut backup: Backup = read_json(&store, BACKUP_KEY).unwrap().unwrap();
        backup.transactions.pop();
        write_json(&store, BACKUP_KEY, &backup).unwrap();
        write_json(&store, TRANSACTIONS_KEY, &Vec::<Transaction>::new()).unwrap();

        let result = backups.restore();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("checksum"));
        assert_eq!(store.get(HOLD_KEY).unwrap(), None);
        let current: Vec<Transaction> = read_json(&store, TRANSACTIONS_KEY).unwrap().unwrap();
        assert!(current.is_empty());
    }

    #[test]
    fn test_restore_unparsable_backup() {
        let store = MemoryStore::new();
        store.set(BACKUP_KEY, "not json").unwrap();
        let backups = BackupManager::new(&store);
        assert!(!backups.restore().success);
        assert!(!backups.get_info().exists);
    }

    #[test]
    fn test_discard() {
        let store = MemoryStore::new();
        let backups = BackupManager::new(&store);
        backups.create_backup(&sample(), 1);
        backups.discard().unwrap();
        assert!(!backups.get_info().exists);
    }
}
