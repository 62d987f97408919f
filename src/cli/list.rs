use comfy_table::{Cell, Table};

use crate::cli::{open_ledger, open_store};
use crate::error::Result;
use crate::fmt::{btc, money};

pub fn run(exchange: Option<String>) -> Result<()> {
    let (settings, store) = open_store()?;
    let ledger = open_ledger(&settings, &store)?;

    let mut table = Table::new();
    table.set_header(vec!["Date", "Exchange", "Type", "USD", "BTC", "Price", "ID"]);
    let mut shown = 0;
    for t in ledger.transactions() {
        if let Some(filter) = &exchange {
            if !t.exchange.eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        table.add_row(vec![
            Cell::new(t.date.format("%Y-%m-%d %H:%M")),
            Cell::new(&t.exchange),
            Cell::new(t.kind),
            Cell::new(money(t.usd_amount)),
            Cell::new(btc(t.btc_amount)),
            Cell::new(money(t.price)),
            Cell::new(&t.id),
        ]);
        shown += 1;
    }

    if shown == 0 {
        println!("No transactions.");
        return Ok(());
    }
    println!("Transactions\n{table}");
    Ok(())
}

pub fn exchanges() -> Result<()> {
    let (settings, store) = open_store()?;
    let ledger = open_ledger(&settings, &store)?;
    for name in ledger.exchanges_list() {
        println!("{name}");
    }
    Ok(())
}
