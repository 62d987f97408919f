use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{IdKind, TransactionData};

const KEY_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

/// Stable id for a transaction. Reference-based when the exchange supplied a
/// usable reference, content-hashed otherwise.
pub fn generate_id(data: &TransactionData) -> String {
    let exchange = exchange_slug(&data.exchange);
    if let Some(reference) = data.reference.as_deref().map(clean_reference) {
        if !reference.is_empty() {
            return format!("{exchange}-ref-{reference}");
        }
    }
    format!("{exchange}-{}", to_base36(string_hash(&composite_key(data))))
}

/// Lowercased exchange name with whitespace runs collapsed to `-`.
pub fn exchange_slug(exchange: &str) -> String {
    exchange
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Keeps only `[A-Za-z0-9_-]` from a trimmed reference.
pub fn clean_reference(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Fixed 8-decimal text so `0.1 + 0.2` and `0.3` hash identically.
pub fn normalize_amount(value: f64) -> String {
    let s = format!("{value:.8}");
    // "-0.00000000" would otherwise differ from "0.00000000"
    if s.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        return format!("{:.8}", 0.0);
    }
    s
}

pub fn composite_key(data: &TransactionData) -> String {
    let sep = KEY_SEPARATOR;
    format!(
        "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
        data.exchange.trim(),
        data.date.format("%Y-%m-%dT%H:%M:%S"),
        data.kind.as_str(),
        normalize_amount(data.usd_amount),
        normalize_amount(data.btc_amount),
        normalize_amount(data.price),
    )
}

/// 32-bit rolling multiply-add (`h * 31 + unit`) over UTF-16 code units,
/// absolute value.
pub fn string_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

pub fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Classification of existing ids
// ---------------------------------------------------------------------------

fn hash_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-z]{1,7}$").expect("valid regex"))
}

fn reference_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"))
}

// {epoch seconds or millis}-{row index}, optionally without the index
fn legacy_timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{10,13}(-\d+)?$").expect("valid regex"))
}

pub fn classify_id(id: &str, exchange: &str) -> IdKind {
    let prefix = format!("{}-", exchange_slug(exchange));
    let Some(rest) = id.strip_prefix(&prefix) else {
        return IdKind::LegacyUnknown(id.to_string());
    };
    if let Some(reference) = rest.strip_prefix("ref-") {
        if reference_suffix_re().is_match(reference) {
            return IdKind::ReferenceBased(reference.to_string());
        }
    }
    if hash_suffix_re().is_match(rest) {
        return IdKind::ContentHashed;
    }
    IdKind::LegacyUnknown(id.to_string())
}

/// Best-effort recovery of an exchange reference embedded in a legacy id of
/// the form `{exchange}-{reference}`. May misclassify; callers must treat a
/// `None` as "no reference", not as an error.
pub fn extract_legacy_reference(id: &str, exchange: &str) -> Option<String> {
    let prefix = format!("{}-", exchange_slug(exchange));
    let head = id.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(&prefix) {
        return None;
    }
    let rest = &id[prefix.len()..];
    let rest = rest.strip_prefix("ref-").unwrap_or(rest);
    if rest.len() < 8 || !reference_suffix_re().is_match(rest) {
        return None;
    }
    if legacy_timestamp_re().is_match(rest) {
        return None;
    }
    if !rest.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(rest.to_string())
}

// ---------------------------------------------------------------------------
// Collision diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCollision {
    pub id: String,
    /// Indexes of the colliding rows in the input slice.
    pub rows: Vec<usize>,
}

/// Rows whose content differs but whose content-hash ids are equal. Intended
/// for test fixtures and diagnostics.
pub fn find_collisions(rows: &[TransactionData]) -> Vec<IdCollision> {
    let mut by_id: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let has_reference = row
            .reference
            .as_deref()
            .is_some_and(|r| !clean_reference(r).is_empty());
        if has_reference {
            continue;
        }
        by_id
            .entry(generate_id(row))
            .or_default()
            .push((i, composite_key(row)));
    }

    by_id
        .into_iter()
        .filter_map(|(id, entries)| {
            let first_key = &entries.first()?.1;
            if entries.iter().all(|(_, key)| key == first_key) {
                return None;
            }
            Some(IdCollision {
                id,
                rows: entries.into_iter().map(|(i, _)| i).collect(),
            })
        })
        .collect()
}
