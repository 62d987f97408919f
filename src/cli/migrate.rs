use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_ledger, open_store};
use crate::error::{LedgerError, Result};
use crate::migration::{validate, IssueKind, MigrationEngine, MigrationResult};
use crate::version::CURRENT_VERSION;

pub fn run(force: bool) -> Result<()> {
    let (_, store) = open_store()?;
    let engine = MigrationEngine::new(&store);
    let existing = engine.stored_transactions()?;

    let result = if force {
        engine.force_migrate(&existing)
    } else {
        match engine.migrate_if_needed(&existing) {
            Some(result) => result,
            None if engine.versions().is_held() => {
                println!("Data was restored from backup; run `satledger migrate --force` to migrate it again.");
                return Ok(());
            }
            None => {
                println!("Already at version {CURRENT_VERSION}; nothing to migrate.");
                return Ok(());
            }
        }
    };

    println!("Migrated:            {}", result.migrated_count);
    println!("Duplicates removed:  {}", result.duplicates_removed);
    println!(
        "Backup created:      {}",
        if result.backup_created { "yes" } else { "no" }
    );
    for error in &result.errors {
        eprintln!("  {} {error}", "error".red());
    }
    if !result.success {
        return Err(LedgerError::Other(failure_message(&result)));
    }
    println!("{}", format!("Ledger is at version {CURRENT_VERSION}").green());
    Ok(())
}

/// The commit failure is always the last recorded error.
fn failure_message(result: &MigrationResult) -> String {
    let cause = result.errors.last().map_or("unknown error", String::as_str);
    format!("migration not saved, stored data is unchanged: {cause}")
}

fn issue_label(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::MissingId => "missing id",
        IssueKind::DuplicateId => "duplicate id",
        IssueKind::MissingField => "missing field",
        IssueKind::InvalidAmount => "invalid amount",
    }
}

pub fn validate_cmd() -> Result<()> {
    let (settings, store) = open_store()?;
    let ledger = open_ledger(&settings, &store)?;
    let report = validate(ledger.transactions());

    let stats = &report.stats;
    println!("Transactions:     {}", stats.total);
    println!("Unique ids:       {}", stats.unique_ids);
    println!("Reference-based:  {}", stats.reference_based);
    println!("Content-hashed:   {}", stats.hash_based);
    println!("Legacy:           {}", stats.legacy);

    if report.valid {
        println!("{}", "No problems found".green());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Row", "ID", "Problem", "Detail"]);
    for issue in &report.issues {
        table.add_row(vec![
            Cell::new(issue.index),
            Cell::new(&issue.id),
            Cell::new(issue_label(issue.kind)),
            Cell::new(&issue.message),
        ]);
    }
    println!("{}\n{table}", format!("{} problems", report.issues.len()).red().bold());
    Err(LedgerError::Other("validation failed".to_string()))
}
