use colored::Colorize;

use crate::backup::BackupManager;
use crate::cli::open_ledger;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::load_settings;
use crate::store::SqliteStore;
use crate::version::{VersionLedger, VersionState};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!(
        "User:       {}",
        settings.user.as_deref().unwrap_or("(signed out)")
    );
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!(
        "Remote dir: {}",
        settings.remote_dir.as_deref().unwrap_or("(not set)")
    );

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `satledger init` to set up.");
        return Ok(());
    }
    println!("DB size:    {}", format_bytes(std::fs::metadata(&db_path)?.len()));

    let store = SqliteStore::open(&db_path)?;
    let versions = VersionLedger::new(&store);
    let version = match versions.state() {
        _ if versions.is_held() => "held (restored from backup)".yellow(),
        VersionState::Current => "current".green(),
        VersionState::Stale(v) => format!("{v} (migration needed)").yellow(),
        VersionState::Absent => "none (migration needed)".yellow(),
    };
    let backup = BackupManager::new(&store).get_info();
    let ledger = open_ledger(&settings, &store)?;
    let provider = ledger.provider();

    println!();
    println!("Version:       {version}");
    println!("Storage:       {}", provider.active_backend());
    if provider.transfer_pending() {
        println!("Transfer:      {}", "pending".yellow());
    }
    if let Some(e) = provider.last_error() {
        println!("Remote error:  {}", e.red());
    }
    println!(
        "Backup:        {}",
        if backup.exists { "yes" } else { "no" }
    );

    println!("Transactions:  {}", ledger.transactions().len());
    println!("Exchanges:     {}", ledger.exchanges_list().join(", "));
    Ok(())
}
