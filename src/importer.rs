use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{LedgerError, Result};
use crate::models::{TransactionData, TransactionType};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Canonical CSV
// ---------------------------------------------------------------------------

const REQUIRED_COLUMNS: &[&str] = &["date", "exchange", "type", "usd_amount", "btc_amount", "price"];

pub struct ImportBatch {
    pub rows: Vec<TransactionData>,
    /// One message per line that could not be parsed.
    pub rejected: Vec<String>,
}

fn column_index(headers: &csv::StringRecord) -> Result<HashMap<String, usize>> {
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase().replace(' ', "_"), i))
        .collect();
    for col in REQUIRED_COLUMNS {
        if !index.contains_key(*col) {
            return Err(LedgerError::InvalidInput(format!("missing column: {col}")));
        }
    }
    Ok(index)
}

fn parse_row(
    record: &csv::StringRecord,
    cols: &HashMap<String, usize>,
) -> std::result::Result<TransactionData, String> {
    let field = |name: &str| -> Option<&str> {
        cols.get(name)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let amount = |name: &str| -> std::result::Result<f64, String> {
        field(name)
            .and_then(parse_amount)
            .ok_or_else(|| format!("invalid {name}"))
    };

    let date = field("date")
        .and_then(parse_date)
        .ok_or_else(|| "invalid date".to_string())?;
    let exchange = field("exchange").ok_or_else(|| "missing exchange".to_string())?;
    let kind: TransactionType = field("type")
        .ok_or_else(|| "missing type".to_string())?
        .parse()
        .map_err(|e: LedgerError| e.to_string())?;

    Ok(TransactionData {
        exchange: exchange.to_string(),
        date,
        kind,
        usd_amount: amount("usd_amount")?.abs(),
        btc_amount: amount("btc_amount")?.abs(),
        price: amount("price")?.abs(),
        reference: field("reference").map(str::to_string),
        destination_wallet: field("destination_wallet").map(str::to_string),
        network_fee: field("network_fee").and_then(parse_amount),
        is_self_custody: field("is_self_custody").map(|v| matches!(v.to_lowercase().as_str(), "true" | "yes" | "1")),
    })
}

pub fn read_csv(file_path: &Path) -> Result<ImportBatch> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let cols = column_index(rdr.headers()?)?;

    let mut rows = Vec::new();
    let mut rejected = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        // header is line 1
        let line = i + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                rejected.push(format!("line {line}: {e}"));
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match parse_row(&record, &cols) {
            Ok(row) => rows.push(row),
            Err(reason) => rejected.push(format!("line {line}: {reason}")),
        }
    }
    if !rejected.is_empty() {
        tracing::warn!("{} rows rejected from {}", rejected.len(), file_path.display());
    }
    Ok(ImportBatch { rows, rejected })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("\"500.00\""), Some(500.0));
        assert_eq!(parse_amount("  -42.50  "), Some(-42.5));
        assert_eq!(parse_amount("$0.00012345"), Some(0.00012345));
        assert_eq!(parse_amount("(50.00)"), Some(-50.0));
        assert_eq!(parse_amount("not_a_number"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_date() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap();
        assert_eq!(parse_date("2024-03-01T12:30:15Z"), Some(expected));
        assert_eq!(parse_date("2024-03-01T14:30:15+02:00"), Some(expected));
        assert_eq!(parse_date("2024-03-01 12:30:15"), Some(expected));
        assert_eq!(
            parse_date("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("03/01/2024"), None);
        assert_eq!(parse_date("2024-02-30"), None);
    }

    #[test]
    fn test_read_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "export.csv",
            "\
Date,Exchange,Type,USD Amount,BTC Amount,Price,Reference
2024-03-01 12:00:00,Strike,Purchase,\"$1,000.00\",0.01,100000,
2024-03-02,Coinbase,Sell,500,0.005,100000,CB-123
2024-03-03,Strike,Withdrawal,0,0.01,0,
",
        );
        let batch = read_csv(&path).unwrap();
        assert!(batch.rejected.is_empty(), "{:?}", batch.rejected);
        assert_eq!(batch.rows.len(), 3);
        assert_eq!(batch.rows[0].usd_amount, 1000.0);
        assert_eq!(batch.rows[0].reference, None);
        assert_eq!(batch.rows[1].kind, TransactionType::Sale);
        assert_eq!(batch.rows[1].reference.as_deref(), Some("CB-123"));
        assert_eq!(batch.rows[2].kind, TransactionType::Withdrawal);
    }

    #[test]
    fn test_read_csv_rejects_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "export.csv",
            "\
date,exchange,type,usd_amount,btc_amount,price
not-a-date,Strike,Purchase,100,0.001,100000
2024-03-01,Strike,Airdrop,100,0.001,100000
2024-03-01,Strike,Purchase,100,abc,100000

2024-03-01,Strike,Purchase,100,0.001,100000
",
        );
        let batch = read_csv(&path).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rejected.len(), 3);
        assert!(batch.rejected[0].starts_with("line 2:"));
        assert!(batch.rejected[2].contains("btc_amount"));
    }

    #[test]
    fn test_read_csv_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "bad.csv", "date,exchange,type\n2024-03-01,Strike,Purchase\n");
        assert!(read_csv(&path).is_err());
    }
}
