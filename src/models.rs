use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::identity::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Purchase,
    Sale,
    Withdrawal,
    Deposit,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "Purchase",
            Self::Sale => "Sale",
            Self::Withdrawal => "Withdrawal",
            Self::Deposit => "Deposit",
            Self::Transfer => "Transfer",
        }
    }

    /// Whether a zero USD amount is legitimate for this type.
    pub fn is_non_monetary(&self) -> bool {
        matches!(self, Self::Withdrawal | Self::Deposit | Self::Transfer)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "purchase" | "buy" => Ok(Self::Purchase),
            "sale" | "sell" => Ok(Self::Sale),
            "withdrawal" | "withdraw" => Ok(Self::Withdrawal),
            "deposit" => Ok(Self::Deposit),
            "transfer" => Ok(Self::Transfer),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

/// A single ledger entry as persisted by either backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub date: DateTime<Utc>,
    pub exchange: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub usd_amount: f64,
    pub btc_amount: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_wallet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_self_custody: Option<bool>,
}

impl Transaction {
    /// Content of this record without its id, for re-deriving identity.
    pub fn content(&self) -> TransactionData {
        TransactionData {
            exchange: self.exchange.clone(),
            date: self.date,
            kind: self.kind,
            usd_amount: self.usd_amount,
            btc_amount: self.btc_amount,
            price: self.price,
            reference: self.reference.clone(),
            destination_wallet: self.destination_wallet.clone(),
            network_fee: self.network_fee,
            is_self_custody: self.is_self_custody,
        }
    }
}

/// Parsed row handed over by the import layer or manual entry, before an id
/// has been assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub exchange: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub usd_amount: f64,
    pub btc_amount: f64,
    pub price: f64,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub destination_wallet: Option<String>,
    #[serde(default)]
    pub network_fee: Option<f64>,
    #[serde(default)]
    pub is_self_custody: Option<bool>,
}

impl TransactionData {
    pub fn into_transaction(self) -> Transaction {
        let id = generate_id(&self);
        self.with_id(id)
    }

    pub fn with_id(self, id: String) -> Transaction {
        Transaction {
            id,
            date: self.date,
            exchange: self.exchange,
            kind: self.kind,
            usd_amount: self.usd_amount,
            btc_amount: self.btc_amount,
            price: self.price,
            reference: self.reference,
            destination_wallet: self.destination_wallet,
            network_fee: self.network_fee,
            is_self_custody: self.is_self_custody,
        }
    }
}

/// Schema marker persisted next to the transaction collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: u32,
    pub migrated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<u32>,
}

/// Single-slot snapshot taken before a migration mutates data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub transactions: Vec<Transaction>,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    /// SHA-256 of the serialized transaction array.
    pub checksum: String,
}

#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub merged: Vec<Transaction>,
    pub duplicate_count: usize,
}

/// How an existing id was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdKind {
    ReferenceBased(String),
    ContentHashed,
    LegacyUnknown(String),
}
