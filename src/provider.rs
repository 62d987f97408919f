use std::fmt;

use crate::dedup::merge;
use crate::error::{LedgerError, Result};
use crate::models::{MergeResult, Transaction};
use crate::remote::{Identity, RemoteStore};
use crate::store::{read_json, write_json, Store, TRANSACTIONS_KEY};

/// Source of the current sign-in state. Read again right before any
/// destructive step so a stale transfer never clears local data.
pub trait AuthSource {
    fn current_identity(&self) -> Option<Identity>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderConfig {
    /// When false the remote store is never consulted.
    pub remote_enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitResult {
    pub success: bool,
    pub backend: BackendKind,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferOutcome {
    /// Local records sent to the remote store.
    pub attempted: usize,
    /// Of those, how many ids the remote already had.
    pub duplicates: usize,
    pub local_cleared: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Local backend
// ---------------------------------------------------------------------------

pub struct LocalBackend<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> LocalBackend<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn get_all(&self) -> Result<Vec<Transaction>> {
        Ok(read_json(self.store, TRANSACTIONS_KEY)?.unwrap_or_default())
    }

    pub fn replace_all(&self, transactions: &[Transaction]) -> Result<()> {
        write_json(self.store, TRANSACTIONS_KEY, transactions)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(TRANSACTIONS_KEY)
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// Uniform read/write surface over the local store and the remote store.
/// Remote is used while a user is signed in and the remote answers; any
/// remote failure drops back to local and marks a transfer as pending.
pub struct StorageProvider<'a, S: Store, R: RemoteStore, A: AuthSource> {
    local: LocalBackend<'a, S>,
    remote: R,
    auth: A,
    config: ProviderConfig,
    active: BackendKind,
    identity: Option<Identity>,
    transfer_pending: bool,
    last_error: Option<String>,
    last_transfer: Option<TransferOutcome>,
}

impl<'a, S: Store, R: RemoteStore, A: AuthSource> StorageProvider<'a, S, R, A> {
    pub fn new(store: &'a S, remote: R, auth: A) -> Self {
        Self {
            local: LocalBackend::new(store),
            remote,
            auth,
            config: ProviderConfig::default(),
            active: BackendKind::Local,
            identity: None,
            transfer_pending: false,
            last_error: None,
            last_transfer: None,
        }
    }

    pub fn active_backend(&self) -> BackendKind {
        self.active
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn transfer_pending(&self) -> bool {
        self.transfer_pending
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Outcome of the most recent local-to-remote transfer, if one ran.
    pub fn last_transfer(&self) -> Option<&TransferOutcome> {
        self.last_transfer.as_ref()
    }

    /// Pick the backend for the current sign-in state. An unreadable local
    /// store only fails initialization when there is no remote to use instead.
    pub fn initialize(&mut self, config: ProviderConfig) -> InitResult {
        self.config = config;
        let local_error = self
            .local
            .get_all()
            .err()
            .map(|e| format!("local store unreadable: {e}"));
        if let Some(e) = &local_error {
            tracing::warn!("{e}");
        }
        self.settle();
        InitResult {
            success: local_error.is_none() || self.active == BackendKind::Remote,
            backend: self.active,
            error: local_error.or_else(|| self.last_error.clone()),
        }
    }

    /// React to any number of sign-in/sign-out notifications by settling on
    /// the state the auth source reports now.
    pub fn on_auth_signal(&mut self) -> Option<TransferOutcome> {
        self.settle()
    }

    fn settle(&mut self) -> Option<TransferOutcome> {
        let identity = if self.config.remote_enabled {
            self.auth.current_identity()
        } else {
            None
        };

        let Some(identity) = identity else {
            if self.active == BackendKind::Remote {
                tracing::info!("Signed out, switching to local storage");
            }
            self.identity = None;
            self.active = BackendKind::Local;
            self.last_error = None;
            return None;
        };

        self.identity = Some(identity.clone());
        if let Err(e) = self.remote.fetch_transactions(&identity).into_result() {
            self.fall_back(&e);
            return None;
        }
        self.active = BackendKind::Remote;
        self.last_error = None;

        match self.local.get_all() {
            Ok(local) if local.is_empty() => {
                self.transfer_pending = false;
                None
            }
            Ok(local) => {
                let outcome = self.transfer(&identity, &local);
                self.last_transfer = Some(outcome.clone());
                Some(outcome)
            }
            Err(e) => {
                tracing::warn!("Could not read local records for transfer: {e}");
                self.transfer_pending = true;
                None
            }
        }
    }

    /// Move local records into the remote store. Local data is cleared only
    /// after the remote write succeeded and the same user is still signed in.
    fn transfer(&mut self, identity: &Identity, local: &[Transaction]) -> TransferOutcome {
        tracing::info!(
            "Transferring {} local transactions to remote for {}",
            local.len(),
            identity.user_id
        );
        let mut outcome = TransferOutcome {
            attempted: local.len(),
            ..Default::default()
        };

        match self.remote_merge(identity, local) {
            Ok(result) => outcome.duplicates = result.duplicate_count,
            Err(e) => {
                self.fall_back(&e);
                outcome.error = Some(e.to_string());
                return outcome;
            }
        }

        if self.auth.current_identity().as_ref() != Some(identity) {
            tracing::warn!("Sign-in state changed during transfer, keeping local records");
            self.transfer_pending = true;
            self.identity = None;
            self.active = BackendKind::Local;
            outcome.error = Some("sign-in state changed during transfer".to_string());
            return outcome;
        }

        match self.local.clear() {
            Ok(()) => {
                outcome.local_cleared = true;
                self.transfer_pending = false;
            }
            Err(e) => {
                tracing::warn!("Remote write succeeded but local clear failed: {e}");
                self.transfer_pending = true;
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    fn fall_back(&mut self, error: &LedgerError) {
        tracing::warn!("Remote store unavailable, using local storage: {error}");
        self.active = BackendKind::Local;
        self.transfer_pending = true;
        self.last_error = Some(error.to_string());
    }

    fn remote_merge(&self, identity: &Identity, incoming: &[Transaction]) -> Result<MergeResult> {
        let existing = self.remote.fetch_transactions(identity).into_result()?;
        let result = merge(&existing, incoming);
        self.remote
            .replace_transactions(identity, &result.merged)
            .into_result()?;
        Ok(result)
    }

    fn signed_in(&self) -> Option<Identity> {
        match self.active {
            BackendKind::Remote => self.identity.clone(),
            BackendKind::Local => None,
        }
    }

    pub fn get_transactions(&mut self) -> Result<Vec<Transaction>> {
        if let Some(identity) = self.signed_in() {
            match self.remote.fetch_transactions(&identity).into_result() {
                Ok(txns) => return Ok(txns),
                Err(e) => self.fall_back(&e),
            }
        }
        self.local.get_all()
    }

    /// Merge `incoming` into the active backend, returning the merge outcome.
    pub fn save_merged(&mut self, incoming: &[Transaction]) -> Result<MergeResult> {
        if let Some(identity) = self.signed_in() {
            match self.remote_merge(&identity, incoming) {
                Ok(result) => return Ok(result),
                Err(e) => self.fall_back(&e),
            }
        }
        let existing = self.local.get_all()?;
        let result = merge(&existing, incoming);
        self.local.replace_all(&result.merged)?;
        Ok(result)
    }

    pub fn save_transactions(&mut self, all: &[Transaction]) -> Result<Vec<Transaction>> {
        Ok(self.save_merged(all)?.merged)
    }

    /// Save one record; returns the version that ended up stored, which is the
    /// existing one when it is dated later.
    pub fn save_transaction(&mut self, txn: &Transaction) -> Result<Transaction> {
        let result = self.save_merged(std::slice::from_ref(txn))?;
        Ok(result
            .merged
            .into_iter()
            .find(|t| t.id == txn.id)
            .unwrap_or_else(|| txn.clone()))
    }

    /// Remove every record. With a remote active, local leftovers are cleared
    /// too so a pending transfer cannot bring them back.
    pub fn clear_transactions(&mut self) -> Result<()> {
        if let Some(identity) = self.signed_in() {
            if let Err(e) = self.remote.clear_transactions(&identity).into_result() {
                self.fall_back(&e);
                return Err(e);
            }
        }
        self.local.clear()?;
        if self.active == BackendKind::Remote {
            self.transfer_pending = false;
        }
        Ok(())
    }
}
