use std::path::PathBuf;

use crate::backup::BackupManager;
use crate::cli::open_store;
use crate::error::{LedgerError, Result};
use crate::fmt::format_bytes;

pub fn info() -> Result<()> {
    let (_, store) = open_store()?;
    let info = BackupManager::new(&store).get_info();
    match (info.exists, info.timestamp, info.count) {
        (true, Some(when), Some(count)) => {
            println!("Backup taken:  {}", when.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Transactions:  {count}");
        }
        _ => println!("No backup."),
    }
    Ok(())
}

pub fn restore() -> Result<()> {
    let (_, store) = open_store()?;
    let result = BackupManager::new(&store).restore();
    if !result.success {
        return Err(LedgerError::Other(
            result.error.unwrap_or_else(|| "restore failed".to_string()),
        ));
    }
    println!("Restored {} transactions from backup", result.count);
    Ok(())
}

pub fn snapshot(output: Option<String>) -> Result<()> {
    let (settings, store) = open_store()?;
    let dest_path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let snapshots_dir = PathBuf::from(&settings.data_dir).join("snapshots");
            std::fs::create_dir_all(&snapshots_dir)?;
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            snapshots_dir.join(format!("satledger-{stamp}.db"))
        }
    };

    let size = store.snapshot_to(&dest_path)?;
    println!("Snapshot saved to {}", dest_path.display());
    println!("Size: {}", format_bytes(size));
    Ok(())
}
