use std::path::PathBuf;

use crate::error::Result;
use crate::migration::MigrationEngine;
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::store::SqliteStore;

pub fn run(data_dir: Option<String>, remote_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(dir) = remote_dir {
        settings.remote_dir = Some(shellexpand_path(&dir));
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join("snapshots"))?;

    let store = SqliteStore::open(&settings.db_path())?;
    let engine = MigrationEngine::new(&store);
    let existing = engine.stored_transactions()?;
    if let Some(result) = engine.migrate_if_needed(&existing) {
        if !result.success {
            tracing::warn!("Initial migration reported {} errors", result.error_count);
        }
    }

    println!("Initialized satledger at {}", resolved.display());
    if let Some(remote) = &settings.remote_dir {
        println!("Remote folder: {remote}");
    }
    Ok(())
}
