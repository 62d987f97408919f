use crate::cli::{open_ledger, open_store};
use crate::error::{LedgerError, Result};

pub fn run(yes: bool) -> Result<()> {
    if !yes {
        return Err(LedgerError::InvalidInput(
            "this deletes every transaction; pass --yes to confirm".to_string(),
        ));
    }
    let (settings, store) = open_store()?;
    let mut ledger = open_ledger(&settings, &store)?;
    let count = ledger.transactions().len();
    ledger.clear_all_transactions()?;
    println!(
        "Removed {count} transactions from {} storage",
        ledger.provider().active_backend()
    );
    Ok(())
}
