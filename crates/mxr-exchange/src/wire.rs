//! JSON shapes returned by the exchange REST API and their conversion into
//! `mxr-schemas` records. The API encodes every decimal as a string.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use mxr_schemas::{FillRecord, FillSide, LedgerEntry, LedgerEntryKind};
use serde::Deserialize;

/// Ids arrive as strings on current endpoints and as integers on older ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StrOrNum {
    Str(String),
    Num(i64),
}

impl StrOrNum {
    fn into_string(self) -> String {
        match self {
            StrOrNum::Str(s) => s,
            StrOrNum::Num(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccount {
    pub id: String,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireLedgerDetails {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireLedgerEntry {
    id: StrOrNum,
    created_at: DateTime<Utc>,
    amount: String,
    #[serde(default)]
    balance: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    details: Option<WireLedgerDetails>,
}

impl WireLedgerEntry {
    pub(crate) fn into_entry(self) -> Result<LedgerEntry> {
        let id = self.id.into_string();
        let details = self.details.unwrap_or_default();
        Ok(LedgerEntry {
            amount: parse_decimal(&self.amount, "amount")
                .with_context(|| format!("ledger entry {id}"))?,
            balance: match self.balance.as_deref() {
                Some(b) => parse_decimal(b, "balance").with_context(|| format!("ledger entry {id}"))?,
                None => 0.0,
            },
            created_at: self.created_at,
            kind: LedgerEntryKind::parse(&self.kind),
            order_id: details.order_id.unwrap_or_default(),
            product_id: details.product_id,
            id,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireFill {
    trade_id: i64,
    product_id: String,
    order_id: String,
    price: String,
    size: String,
    #[serde(default)]
    fee: Option<String>,
    side: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    settled: bool,
}

impl WireFill {
    pub(crate) fn into_fill(self) -> Result<FillRecord> {
        let ctx = || format!("fill trade_id={} order_id={}", self.trade_id, self.order_id);
        let side = match self.side.as_str() {
            "buy" => FillSide::Buy,
            "sell" => FillSide::Sell,
            other => return Err(anyhow!("unknown fill side '{other}' in {}", ctx())),
        };
        Ok(FillRecord {
            price: parse_decimal(&self.price, "price").with_context(ctx)?,
            size: parse_decimal(&self.size, "size").with_context(ctx)?,
            fee: match self.fee.as_deref() {
                Some(f) => parse_decimal(f, "fee").with_context(ctx)?,
                None => 0.0,
            },
            trade_id: self.trade_id,
            order_id: self.order_id,
            product_id: self.product_id,
            side,
            created_at: self.created_at,
            settled: self.settled,
        })
    }
}

/// Error body shape: `{"message": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireError {
    message: Option<String>,
}

/// Best-effort human message from an error body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<WireError>(body) {
        Ok(WireError { message: Some(m) }) => m,
        _ => body.chars().take(200).collect(),
    }
}

fn parse_decimal(s: &str, field: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .with_context(|| format!("invalid decimal for {field}: '{s}'"))
}
