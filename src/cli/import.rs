use std::path::Path;

use colored::Colorize;

use crate::cli::{open_ledger, open_store};
use crate::error::{LedgerError, Result};
use crate::identity::find_collisions;
use crate::importer::read_csv;

pub fn run(file: &str) -> Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        return Err(LedgerError::InvalidInput(format!("file not found: {file}")));
    }
    let batch = read_csv(path)?;
    for reason in &batch.rejected {
        eprintln!("  {} {reason}", "skipped".yellow());
    }
    for collision in find_collisions(&batch.rows) {
        // distinct rows sharing an id; merge keeps only one of them
        eprintln!(
            "  {} id {} shared by rows {:?}",
            "warning".yellow(),
            collision.id,
            collision.rows
        );
    }

    let (settings, store) = open_store()?;
    let mut ledger = open_ledger(&settings, &store)?;
    let summary = ledger.merge_transactions(batch.rows)?;

    println!(
        "Imported {} transactions ({} duplicates skipped) into {} storage",
        summary.added,
        summary.duplicates,
        ledger.provider().active_backend()
    );
    if !batch.rejected.is_empty() {
        println!("{} rows could not be read", batch.rejected.len());
    }
    Ok(())
}
