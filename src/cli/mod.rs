pub mod add;
pub mod auth;
pub mod backup;
pub mod clear;
pub mod import;
pub mod init;
pub mod list;
pub mod migrate;
pub mod status;

use clap::{Parser, Subcommand};

use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, LoadState};
use crate::provider::ProviderConfig;
use crate::remote::FolderRemote;
use crate::settings::{load_settings, Settings, SettingsAuth};
use crate::store::SqliteStore;

pub(crate) type AppLedger<'a> = Ledger<'a, SqliteStore, FolderRemote, SettingsAuth>;

/// Open the SQLite store under the configured data directory.
pub(crate) fn open_store() -> Result<(Settings, SqliteStore)> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(LedgerError::Other(format!(
            "no ledger at {}. Run `satledger init` to set up.",
            db_path.display()
        )));
    }
    let store = SqliteStore::open(&db_path)?;
    Ok((settings, store))
}

pub(crate) fn open_ledger<'a>(settings: &Settings, store: &'a SqliteStore) -> Result<AppLedger<'a>> {
    let config = ProviderConfig {
        remote_enabled: settings.remote_enabled,
    };
    let ledger = Ledger::open(store, FolderRemote::new(settings.remote_path()), SettingsAuth, config);
    if let LoadState::Failed(reason) = ledger.status() {
        return Err(LedgerError::Other(format!("could not load transactions: {reason}")));
    }
    Ok(ledger)
}

#[derive(Parser)]
#[command(name = "satledger", about = "Personal bitcoin transaction ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the ledger database.
    Init {
        /// Path for ledger data (default: ~/Documents/satledger)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Synced folder used as the remote store
        #[arg(long = "remote-dir")]
        remote_dir: Option<String>,
    },
    /// Import an exchange export in the canonical CSV layout.
    Import {
        /// Path to CSV file
        file: String,
    },
    /// Record a single transaction.
    Add {
        /// Date (YYYY-MM-DD, YYYY-MM-DD HH:MM:SS or RFC 3339)
        #[arg(long)]
        date: String,
        #[arg(long)]
        exchange: String,
        /// purchase, sale, withdrawal, deposit or transfer
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        usd: f64,
        #[arg(long)]
        btc: f64,
        /// USD per BTC (default: usd / btc)
        #[arg(long)]
        price: Option<f64>,
        /// Exchange-issued reference
        #[arg(long)]
        reference: Option<String>,
    },
    /// List transactions, oldest first.
    List {
        /// Only show this exchange
        #[arg(long)]
        exchange: Option<String>,
    },
    /// List the exchanges that appear in the ledger.
    Exchanges,
    /// Delete every transaction.
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Re-derive transaction ids under the current scheme.
    Migrate {
        /// Migrate even when the stored data is already current
        #[arg(long)]
        force: bool,
    },
    /// Check the stored transactions for id and amount problems.
    Validate,
    /// Inspect or restore the pre-migration backup.
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Copy the whole database file.
    Snapshot {
        /// Output path (default: <data_dir>/snapshots/satledger-<timestamp>.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Sign in and move local transactions to the remote store.
    Login {
        user: String,
    },
    /// Sign out and return to local storage.
    Logout,
    /// Retry a pending transfer to the remote store.
    Sync,
    /// Show storage, sign-in and migration status.
    Status,
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Show whether a backup exists and what it holds.
    Info,
    /// Put the backed-up transactions and version marker back.
    Restore,
}
