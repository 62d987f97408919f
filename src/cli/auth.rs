use colored::Colorize;

use crate::cli::{open_ledger, open_store};
use crate::error::{LedgerError, Result};
use crate::provider::{BackendKind, TransferOutcome};
use crate::settings::{load_settings, save_settings};

fn report_transfer(outcome: Option<&TransferOutcome>) {
    let Some(outcome) = outcome else {
        return;
    };
    match &outcome.error {
        None => println!(
            "Moved {} local transactions to remote ({} already there)",
            outcome.attempted, outcome.duplicates
        ),
        Some(e) => eprintln!(
            "{} transfer incomplete, local records kept: {e}",
            "warning".yellow()
        ),
    }
}

pub fn login(user: &str) -> Result<()> {
    let user = user.trim();
    if user.is_empty() {
        return Err(LedgerError::InvalidInput("user must not be empty".to_string()));
    }
    let (mut settings, store) = open_store()?;
    let mut ledger = open_ledger(&settings, &store)?;

    settings.user = Some(user.to_string());
    save_settings(&settings)?;
    let outcome = ledger.on_auth_signal();

    println!("Signed in as {user}");
    report_transfer(outcome.as_ref());
    if ledger.provider().active_backend() == BackendKind::Local {
        let reason = ledger.provider().last_error().unwrap_or("remote disabled");
        eprintln!("{} using local storage: {reason}", "warning".yellow());
    }
    Ok(())
}

pub fn logout() -> Result<()> {
    let mut settings = load_settings();
    match settings.user.take() {
        Some(user) => {
            save_settings(&settings)?;
            println!("Signed out {user}; new transactions stay on this machine");
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

pub fn sync() -> Result<()> {
    let (settings, store) = open_store()?;
    if settings.user.is_none() {
        return Err(LedgerError::Other("not signed in; run `satledger login <user>`".to_string()));
    }
    let ledger = open_ledger(&settings, &store)?;
    let provider = ledger.provider();
    report_transfer(provider.last_transfer());

    match provider.active_backend() {
        BackendKind::Remote if !provider.transfer_pending() => {
            println!("{}", "In sync with remote".green());
            Ok(())
        }
        BackendKind::Remote => Err(LedgerError::Other(
            "local records could not be cleared; run `satledger sync` again".to_string(),
        )),
        BackendKind::Local => Err(LedgerError::Remote(
            provider.last_error().unwrap_or("remote disabled").to_string(),
        )),
    }
}
