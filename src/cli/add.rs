use crate::cli::{open_ledger, open_store};
use crate::error::{LedgerError, Result};
use crate::fmt::{btc, money};
use crate::importer::parse_date;
use crate::models::{TransactionData, TransactionType};

pub struct AddArgs {
    pub date: String,
    pub exchange: String,
    pub kind: String,
    pub usd: f64,
    pub btc: f64,
    pub price: Option<f64>,
    pub reference: Option<String>,
}

pub fn run(args: AddArgs) -> Result<()> {
    let date = parse_date(&args.date)
        .ok_or_else(|| LedgerError::InvalidInput(format!("invalid date: {}", args.date)))?;
    let kind: TransactionType = args.kind.parse()?;
    let price = args.price.unwrap_or(if args.btc > 0.0 {
        args.usd / args.btc
    } else {
        0.0
    });

    let data = TransactionData {
        exchange: args.exchange.trim().to_string(),
        date,
        kind,
        usd_amount: args.usd,
        btc_amount: args.btc,
        price,
        reference: args.reference.filter(|r| !r.trim().is_empty()),
        destination_wallet: None,
        network_fee: None,
        is_self_custody: None,
    };

    let (settings, store) = open_store()?;
    let mut ledger = open_ledger(&settings, &store)?;
    let saved = ledger.add_transaction(data)?;
    println!(
        "Saved {} {} {} for {} ({})",
        saved.kind,
        btc(saved.btc_amount),
        saved.exchange,
        money(saved.usd_amount),
        saved.id
    );
    Ok(())
}
