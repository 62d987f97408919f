use std::collections::HashMap;

use chrono::Utc;

use crate::backup::BackupManager;
use crate::dedup::dedupe;
use crate::error::Result;
use crate::identity::{classify_id, clean_reference, extract_legacy_reference, generate_id};
use crate::models::{IdKind, Transaction, TransactionData, VersionRecord};
use crate::store::{json_op, read_json, Store, StoreOp, HOLD_KEY, TRANSACTIONS_KEY, VERSION_KEY};
use crate::version::{VersionLedger, CURRENT_VERSION};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationResult {
    pub success: bool,
    pub migrated_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub duplicates_removed: usize,
    pub backup_created: bool,
}

/// Re-derives every stored id under the current scheme, gated by the
/// version ledger. Safe to call from several processes: a second run on
/// current data is a no-op through `migrate_if_needed`.
pub struct MigrationEngine<'a, S: Store> {
    store: &'a S,
    versions: VersionLedger<'a, S>,
    backups: BackupManager<'a, S>,
}

impl<'a, S: Store> MigrationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            versions: VersionLedger::new(store),
            backups: BackupManager::new(store),
        }
    }

    pub fn versions(&self) -> &VersionLedger<'a, S> {
        &self.versions
    }

    pub fn backups(&self) -> &BackupManager<'a, S> {
        &self.backups
    }

    /// Transactions currently persisted in the local store.
    pub fn stored_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(read_json(self.store, TRANSACTIONS_KEY)?.unwrap_or_default())
    }

    pub fn migrate_if_needed(&self, existing: &[Transaction]) -> Option<MigrationResult> {
        if !self.versions.needs_migration() {
            tracing::debug!("Stored data is at version {CURRENT_VERSION}, skipping migration");
            return None;
        }
        if self.versions.is_held() {
            tracing::info!("Data was restored from backup, skipping migration until forced");
            return None;
        }
        Some(self.migrate(existing))
    }

    /// Clear the version marker and migrate regardless of state.
    pub fn force_migrate(&self, existing: &[Transaction]) -> MigrationResult {
        let previous = self.versions.get_version();
        if let Err(e) = self.versions.reset() {
            tracing::warn!("Could not reset version marker before forced migration: {e}");
        }
        self.run(existing, previous.map(|r| r.version))
    }

    pub fn migrate(&self, existing: &[Transaction]) -> MigrationResult {
        let previous = self.versions.get_version().map(|r| r.version);
        self.run(existing, previous)
    }

    fn run(&self, existing: &[Transaction], previous_version: Option<u32>) -> MigrationResult {
        tracing::info!(
            "Migrating {} transactions from version {} to {CURRENT_VERSION}",
            existing.len(),
            previous_version.map_or_else(|| "none".to_string(), |v| v.to_string()),
        );

        let backup_created = self
            .backups
            .create_backup(existing, previous_version.unwrap_or(0));

        let mut migrated = Vec::with_capacity(existing.len());
        let mut errors = Vec::new();
        let mut migrated_count = 0usize;
        for (i, txn) in existing.iter().enumerate() {
            match reconstruct(txn) {
                Ok(data) => {
                    let mut updated = txn.clone();
                    updated.id = generate_id(&data);
                    if updated.id != txn.id {
                        tracing::debug!("Rewrote id {} -> {}", txn.id, updated.id);
                    }
                    migrated.push(updated);
                    migrated_count += 1;
                }
                Err(reason) => {
                    tracing::warn!("Row {i} (id {}) not migrated: {reason}", txn.id);
                    errors.push(format!("row {i} (id {}): {reason}", txn.id));
                    migrated.push(txn.clone());
                }
            }
        }

        let deduped = dedupe(&migrated);
        let record = VersionRecord {
            version: CURRENT_VERSION,
            migrated_at: Utc::now(),
            previous_version,
        };

        let mut result = MigrationResult {
            success: true,
            migrated_count,
            error_count: errors.len(),
            errors,
            duplicates_removed: deduped.duplicate_count,
            backup_created,
        };

        if let Err(e) = self.commit(&deduped.merged, &record) {
            tracing::warn!("Migration commit failed: {e}");
            result.success = false;
            result.errors.push(format!("commit failed: {e}"));
            return result;
        }

        tracing::info!(
            "Migration complete: {} migrated, {} errors, {} duplicates removed",
            result.migrated_count,
            result.error_count,
            result.duplicates_removed,
        );
        result
    }

    fn commit(&self, transactions: &[Transaction], record: &VersionRecord) -> Result<()> {
        self.store.apply(&[
            json_op(TRANSACTIONS_KEY, transactions)?,
            json_op(VERSION_KEY, record)?,
            StoreOp::remove(HOLD_KEY),
        ])
    }
}

/// Rebuild the content a stored record was created from. The reference is
/// taken from the record when present, otherwise recovered from the old id.
fn reconstruct(txn: &Transaction) -> std::result::Result<TransactionData, String> {
    if txn.exchange.trim().is_empty() {
        return Err("missing exchange".to_string());
    }
    for (field, value) in [
        ("usdAmount", txn.usd_amount),
        ("btcAmount", txn.btc_amount),
        ("price", txn.price),
    ] {
        if !value.is_finite() {
            return Err(format!("{field} is not a finite number"));
        }
    }

    let mut data = txn.content();
    let has_reference = data
        .reference
        .as_deref()
        .is_some_and(|r| !clean_reference(r).is_empty());
    if !has_reference {
        data.reference = match classify_id(&txn.id, &txn.exchange) {
            IdKind::ReferenceBased(reference) => Some(reference),
            IdKind::ContentHashed => None,
            IdKind::LegacyUnknown(raw) => extract_legacy_reference(&raw, &txn.exchange),
        };
    }
    Ok(data)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    MissingId,
    DuplicateId,
    MissingField,
    InvalidAmount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub index: usize,
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub total: usize,
    pub unique_ids: usize,
    pub reference_based: usize,
    pub hash_based: usize,
    pub legacy: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub stats: ValidationStats,
}

/// Read-only integrity scan. Problems are reported, never corrected.
pub fn validate(transactions: &[Transaction]) -> ValidationReport {
    let mut issues = Vec::new();
    let mut stats = ValidationStats {
        total: transactions.len(),
        ..Default::default()
    };
    let mut first_seen: HashMap<&str, usize> = HashMap::new();

    let mut issue = |kind: IssueKind, index: usize, txn: &Transaction, message: String| {
        issues.push(ValidationIssue {
            kind,
            index,
            id: txn.id.clone(),
            message,
        });
    };

    for (i, txn) in transactions.iter().enumerate() {
        if txn.id.trim().is_empty() {
            issue(IssueKind::MissingId, i, txn, "transaction has no id".to_string());
        } else if let Some(first) = first_seen.get(txn.id.as_str()) {
            issue(
                IssueKind::DuplicateId,
                i,
                txn,
                format!("id {} already used by row {first}", txn.id),
            );
        } else {
            first_seen.insert(txn.id.as_str(), i);
            match classify_id(&txn.id, &txn.exchange) {
                IdKind::ReferenceBased(_) => stats.reference_based += 1,
                IdKind::ContentHashed => stats.hash_based += 1,
                IdKind::LegacyUnknown(_) => stats.legacy += 1,
            }
        }

        if txn.exchange.trim().is_empty() {
            issue(IssueKind::MissingField, i, txn, "missing exchange".to_string());
        }

        if !(txn.btc_amount.is_finite() && txn.btc_amount > 0.0) {
            issue(
                IssueKind::InvalidAmount,
                i,
                txn,
                format!("btcAmount must be positive, got {}", txn.btc_amount),
            );
        }
        let usd_ok = if txn.kind.is_non_monetary() {
            txn.usd_amount.is_finite() && txn.usd_amount >= 0.0
        } else {
            txn.usd_amount.is_finite() && txn.usd_amount > 0.0
        };
        if !usd_ok {
            issue(
                IssueKind::InvalidAmount,
                i,
                txn,
                format!("usdAmount {} is not valid for a {}", txn.usd_amount, txn.kind),
            );
        }
        if !(txn.price.is_finite() && txn.price >= 0.0) {
            issue(
                IssueKind::InvalidAmount,
                i,
                txn,
                format!("price must not be negative, got {}", txn.price),
            );
        }
    }

    stats.unique_ids = first_seen.len();

    ValidationReport {
        valid: issues.is_empty(),
        issues,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::models::fixtures::{date, purchase, txn};
    use crate::models::TransactionType;
    use crate::store::{write_json, MemoryStore};

    fn legacy_strike() -> Transaction {
        let mut t = purchase("Strike", date(2023, 11, 14, 22, 13, 20), 100.0, 0.001)
            .with_id("strike-1699999999000-0".to_string());
        t.price = 100000.0;
        t
    }

    #[test]
    fn test_migrates_legacy_strike_row() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let result = engine.migrate(&[legacy_strike()]);
        assert!(result.success);
        assert_eq!(result.migrated_count, 1);
        assert_eq!(result.error_count, 0);
        assert!(result.backup_created);

        let stored = engine.stored_transactions().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(classify_id(&stored[0].id, "Strike"), IdKind::ContentHashed);
        assert_eq!(stored[0].id, generate_id(&legacy_strike().content()));
        assert!(!engine.versions().needs_migration());
    }

    #[test]
    fn test_reference_recovered_from_legacy_id() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let mut t = txn("coinbase-5f1e2d3c-aaaa", date(2024, 1, 1, 0, 0, 0));
        t.exchange = "Coinbase".to_string();
        engine.migrate(&[t]);
        let stored = engine.stored_transactions().unwrap();
        assert_eq!(stored[0].id, "coinbase-ref-5f1e2d3c-aaaa");
        assert_eq!(stored[0].reference, None);
    }

    #[test]
    fn test_existing_reference_wins_over_id() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let mut t = txn("strike-old", date(2024, 1, 1, 0, 0, 0));
        t.reference = Some("TX 42".to_string());
        engine.migrate(&[t]);
        assert_eq!(engine.stored_transactions().unwrap()[0].id, "strike-ref-TX42");
    }

    #[test]
    fn test_row_errors_do_not_abort() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let mut bad = txn("broken", date(2024, 1, 1, 0, 0, 0));
        bad.exchange = "  ".to_string();
        let mut nan = txn("nan", date(2024, 1, 1, 0, 0, 1));
        nan.usd_amount = f64::NAN;
        let good = legacy_strike();

        let result = engine.migrate(&[bad, good, nan]);
        assert!(result.success);
        assert_eq!(result.migrated_count, 1);
        assert_eq!(result.error_count, 2);
        assert!(result.errors[0].contains("row 0 (id broken)"));
        assert!(result.errors[1].contains("usdAmount"));
        // failed rows are kept as they were
        let ids: Vec<_> = engine.stored_transactions().unwrap().into_iter().map(|t| t.id).collect();
        assert!(ids.contains(&"broken".to_string()));
        assert!(ids.contains(&"nan".to_string()));
    }

    #[test]
    fn test_collapses_ids_that_become_equal() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let a = legacy_strike();
        let mut b = legacy_strike();
        b.id = "strike-1699999999000-7".to_string();
        let result = engine.migrate(&[a, b]);
        assert_eq!(result.migrated_count, 2);
        assert_eq!(result.duplicates_removed, 1);
        assert_eq!(engine.stored_transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_version_record_tracks_previous() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        engine
            .versions()
            .set_version(&VersionRecord {
                version: 1,
                migrated_at: Utc::now(),
                previous_version: None,
            })
            .unwrap();
        engine.migrate(&[]);
        let record = engine.versions().get_version().unwrap();
        assert_eq!(record.version, CURRENT_VERSION);
        assert_eq!(record.previous_version, Some(1));
    }

    #[test]
    fn test_migrate_if_needed_is_noop_when_current() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let first = engine.migrate_if_needed(&[legacy_strike()]).unwrap();
        assert_eq!(first.migrated_count, 1);
        let record = engine.versions().get_version().unwrap();

        let stored = engine.stored_transactions().unwrap();
        assert!(engine.migrate_if_needed(&stored).is_none());
        assert_eq!(engine.versions().get_version().unwrap(), record);
    }

    #[test]
    fn test_rerun_is_idempotent_on_ids() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        engine.migrate(&[legacy_strike()]);
        let once = engine.stored_transactions().unwrap();
        let result = engine.force_migrate(&once);
        assert_eq!(result.migrated_count, 1);
        assert_eq!(engine.stored_transactions().unwrap(), once);
    }

    #[test]
    fn test_force_migrate_ends_current() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        engine.migrate(&[]);
        let result = engine.force_migrate(&[legacy_strike()]);
        assert!(result.success);
        let record = engine.versions().get_version().unwrap();
        assert_eq!(record.version, CURRENT_VERSION);
        assert_eq!(record.previous_version, Some(CURRENT_VERSION));
    }

    #[test]
    fn test_commit_failure_reports_unsuccessful() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let engine = MigrationEngine::new(&store);
        let result = engine.migrate(&[legacy_strike()]);
        assert!(!result.success);
        assert!(!result.backup_created);
        assert!(engine.versions().needs_migration());
    }

    #[test]
    fn test_backup_failure_does_not_block_migration() {
        let store = MemoryStore::new();
        store.fail_sets(true);
        let engine = MigrationEngine::new(&store);
        let result = engine.migrate(&[legacy_strike()]);
        assert!(!result.backup_created);
        assert!(result.success);
        assert_eq!(result.migrated_count, 1);
        assert!(!engine.backups().get_info().exists);
        assert!(!engine.versions().needs_migration());
        let stored = engine.stored_transactions().unwrap();
        assert_eq!(stored[0].id, generate_id(&legacy_strike().content()));
    }

    #[test]
    fn test_restore_returns_pre_migration_count() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let a = legacy_strike();
        let mut b = legacy_strike();
        b.id = "strike-1699999999000-1".to_string();
        let c = txn("strike-1700000000000-2", date(2024, 5, 5, 5, 5, 5));
        let before = vec![a, b, c];
        write_json(&store, TRANSACTIONS_KEY, &before).unwrap();

        engine.migrate(&before);
        assert_eq!(engine.stored_transactions().unwrap().len(), 2);

        let restored = engine.backups().restore();
        assert!(restored.success);
        assert_eq!(restored.count, 3);
        assert_eq!(engine.stored_transactions().unwrap(), before);
        assert!(engine.versions().needs_migration());

        // restored data stays put until a forced run
        assert!(engine.versions().is_held());
        assert!(engine.migrate_if_needed(&before).is_none());
        assert_eq!(engine.stored_transactions().unwrap(), before);

        let forced = engine.force_migrate(&before);
        assert!(forced.success);
        assert!(!engine.versions().is_held());
        assert_eq!(engine.stored_transactions().unwrap().len(), 2);
    }

    #[test]
    fn test_thousand_rows_scale_linearly() {
        let store = MemoryStore::new();
        let engine = MigrationEngine::new(&store);
        let rows: Vec<Transaction> = (0..1000u32)
            .map(|i| {
                let when = date(2024, 1, 1 + i / 100, (i / 60) % 24, i % 60, 0);
                purchase("Strike", when, 100.0 + f64::from(i), 0.001)
                    .with_id(format!("strike-1699999999000-{i}"))
            })
            .collect();
        let started = Instant::now();
        let result = engine.migrate(&rows);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.migrated_count, 1000);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.duplicates_removed, 0);
    }

    #[test]
    fn test_validate_clean_set() {
        let mut with_ref = purchase("Coinbase", date(2024, 1, 1, 0, 0, 0), 50.0, 0.0005);
        with_ref.reference = Some("abc123".to_string());
        let rows = vec![
            with_ref.into_transaction(),
            purchase("Strike", date(2024, 1, 2, 0, 0, 0), 100.0, 0.001).into_transaction(),
            txn("strike-1699999999000-0", date(2024, 1, 3, 0, 0, 0)),
        ];
        let report = validate(&rows);
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(report.stats.total, 3);
        assert_eq!(report.stats.unique_ids, 3);
        assert_eq!(report.stats.reference_based, 1);
        assert_eq!(report.stats.hash_based, 1);
        assert_eq!(report.stats.legacy, 1);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut missing_id = txn("", date(2024, 1, 1, 0, 0, 0));
        missing_id.exchange = String::new();
        let dup_a = txn("strike-a", date(2024, 1, 1, 0, 0, 0));
        let mut dup_b = txn("strike-a", date(2024, 1, 2, 0, 0, 0));
        dup_b.btc_amount = 0.0;
        let mut sale = txn("strike-b", date(2024, 1, 3, 0, 0, 0));
        sale.kind = TransactionType::Sale;
        sale.usd_amount = 0.0;
        sale.price = -1.0;
        let mut withdrawal = txn("strike-c", date(2024, 1, 4, 0, 0, 0));
        withdrawal.kind = TransactionType::Withdrawal;
        withdrawal.usd_amount = 0.0;
        withdrawal.price = 0.0;

        let rows = vec![missing_id, dup_a, dup_b, sale, withdrawal];
        let report = validate(&rows);
        assert!(!report.valid);
        let kinds: Vec<_> = report.issues.iter().map(|i| (i.kind, i.index)).collect();
        assert!(kinds.contains(&(IssueKind::MissingId, 0)));
        assert!(kinds.contains(&(IssueKind::MissingField, 0)));
        assert!(kinds.contains(&(IssueKind::DuplicateId, 2)));
        assert!(kinds.contains(&(IssueKind::InvalidAmount, 2)));
        assert_eq!(kinds.iter().filter(|(_, i)| *i == 3).count(), 2);
        assert!(!kinds.iter().any(|(_, i)| *i == 4));
        assert_eq!(report.stats.unique_ids, 3);
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let rows = vec![txn("x", date(2024, 1, 1, 0, 0, 0)), txn("x", date(2024, 1, 1, 0, 0, 0))];
        let copy = rows.clone();
        validate(&rows);
        assert_eq!(rows, copy);
    }
}
