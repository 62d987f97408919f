use std::collections::BTreeSet;

use crate::error::{LedgerError, Result};
use crate::migration::{MigrationEngine, MigrationResult};
use crate::models::{Transaction, TransactionData};
use crate::provider::{AuthSource, InitResult, ProviderConfig, StorageProvider, TransferOutcome};
use crate::remote::RemoteStore;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub duplicates: usize,
}

/// The materialized transaction set plus the only mutation surface the rest
/// of the application uses.
pub struct Ledger<'a, S: Store, R: RemoteStore, A: AuthSource> {
    provider: StorageProvider<'a, S, R, A>,
    transactions: Vec<Transaction>,
    state: LoadState,
    init: InitResult,
    migration: Option<MigrationResult>,
}

impl<'a, S: Store, R: RemoteStore, A: AuthSource> Ledger<'a, S, R, A> {
    /// Migrate the local store if its version marker asks for it, pick a
    /// backend, and load the current set.
    pub fn open(store: &'a S, remote: R, auth: A, config: ProviderConfig) -> Self {
        let engine = MigrationEngine::new(store);
        let migration = match engine.stored_transactions() {
            Ok(existing) => engine.migrate_if_needed(&existing),
            Err(e) => {
                // never migrate what could not be read; that would write an empty set
                tracing::warn!("Skipping migration, local records unreadable: {e}");
                None
            }
        };

        let mut provider = StorageProvider::new(store, remote, auth);
        let init = provider.initialize(config);
        let mut ledger = Self {
            provider,
            transactions: Vec::new(),
            state: LoadState::Idle,
            init,
            migration,
        };
        if let Err(e) = ledger.refresh() {
            tracing::warn!("Initial load failed: {e}");
        }
        ledger
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn status(&self) -> &LoadState {
        &self.state
    }

    pub fn init_result(&self) -> &InitResult {
        &self.init
    }

    pub fn migration(&self) -> Option<&MigrationResult> {
        self.migration.as_ref()
    }

    pub fn provider(&self) -> &StorageProvider<'a, S, R, A> {
        &self.provider
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.state = LoadState::Loading;
        match self.provider.get_transactions() {
            Ok(mut txns) => {
                txns.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
                self.transactions = txns;
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = LoadState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    pub fn add_transaction(&mut self, data: TransactionData) -> Result<Transaction> {
        check_entry(&data)?;
        let saved = self.provider.save_transaction(&data.into_transaction())?;
        self.refresh()?;
        Ok(saved)
    }

    /// Merge imported rows. Rows whose id is already stored count as
    /// duplicates; re-importing the same file adds nothing.
    pub fn merge_transactions(&mut self, rows: Vec<TransactionData>) -> Result<ImportSummary> {
        let incoming: Vec<Transaction> = rows
            .into_iter()
            .map(TransactionData::into_transaction)
            .collect();
        let result = self.provider.save_merged(&incoming)?;
        self.refresh()?;
        Ok(ImportSummary {
            added: incoming.len() - result.duplicate_count,
            duplicates: result.duplicate_count,
        })
    }

    pub fn clear_all_transactions(&mut self) -> Result<()> {
        self.provider.clear_transactions()?;
        self.refresh()
    }

    pub fn exchanges_list(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.exchange.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn on_auth_signal(&mut self) -> Option<TransferOutcome> {
        let outcome = self.provider.on_auth_signal();
        if let Err(e) = self.refresh() {
            tracing::warn!("Reload after sign-in change failed: {e}");
        }
        outcome
    }
}

fn check_entry(data: &TransactionData) -> Result<()> {
    if data.exchange.trim().is_empty() {
        return Err(LedgerError::InvalidInput("exchange is required".to_string()));
    }
    if !(data.btc_amount.is_finite() && data.btc_amount > 0.0) {
        return Err(LedgerError::InvalidInput(format!(
            "BTC amount must be positive, got {}",
            data.btc_amount
        )));
    }
    if !(data.usd_amount.is_finite() && data.usd_amount >= 0.0) {
        return Err(LedgerError::InvalidInput(format!(
            "USD amount must not be negative, got {}",
            data.usd_amount
        )));
    }
    if data.usd_amount == 0.0 && !data.kind.is_non_monetary() {
        return Err(LedgerError::InvalidInput(format!(
            "USD amount of a {} must be positive",
            data.kind
        )));
    }
    if !(data.price.is_finite() && data.price >= 0.0) {
        return Err(LedgerError::InvalidInput(format!(
            "price must not be negative, got {}",
            data.price
        )));
    }
    Ok(())
}
