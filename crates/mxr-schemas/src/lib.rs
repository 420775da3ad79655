//! mxr-schemas
//!
//! Shared record shapes for both reconciliation streams (mined payouts and
//! exchange ledger rows), the merged timeline event, and the exchange
//! transactions the reconciler produces.
//!
//! Plain data only. No IO, no valuation logic beyond per-record USD helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// One mined payout that has not yet been matched against exchange proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub pool: String,
    /// Payout time (whole UTC seconds in the backing store).
    pub time: DateTime<Utc>,
    /// Mined amount in the payout currency.
    pub amount: f64,
    pub receipt: bool,
    /// USD rate of the payout currency at payout time.
    pub usd_rate: f64,
}

impl PaymentRecord {
    pub fn new(
        pool: impl Into<String>,
        time: DateTime<Utc>,
        amount: f64,
        receipt: bool,
        usd_rate: f64,
    ) -> Self {
        Self {
            pool: pool.into(),
            time,
            amount,
            receipt,
            usd_rate,
        }
    }

    /// USD value of this payout (`amount × usd_rate`).
    pub fn usd_value(&self) -> f64 {
        self.amount * self.usd_rate
    }

    pub fn key(&self) -> PaymentKey {
        PaymentKey {
            pool: self.pool.clone(),
            time_secs: self.time.timestamp(),
        }
    }
}

/// Identity of a payment in the backing store: `(pool, time)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaymentKey {
    pub pool: String,
    pub time_secs: i64,
}

impl fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.pool, self.time_secs)
    }
}

// ---------------------------------------------------------------------------
// Exchange ledger
// ---------------------------------------------------------------------------

/// Exchange ledger row type.
///
/// Unknown type strings map to [`LedgerEntryKind::Other`] so a new exchange
/// entry type cannot fail a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryKind {
    #[serde(alias = "trade")]
    Match,
    Transfer,
    Fee,
    Rebate,
    Conversion,
    #[serde(other)]
    Other,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::Match => "match",
            LedgerEntryKind::Transfer => "transfer",
            LedgerEntryKind::Fee => "fee",
            LedgerEntryKind::Rebate => "rebate",
            LedgerEntryKind::Conversion => "conversion",
            LedgerEntryKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "match" | "trade" => LedgerEntryKind::Match,
            "transfer" => LedgerEntryKind::Transfer,
            "fee" => LedgerEntryKind::Fee,
            "rebate" => LedgerEntryKind::Rebate,
            "conversion" => LedgerEntryKind::Conversion,
            _ => LedgerEntryKind::Other,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, LedgerEntryKind::Transfer)
    }
}

/// One exchange account activity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Signed change to the account balance.
    pub amount: f64,
    pub balance: f64,
    pub kind: LedgerEntryKind,
    /// Order that produced this row. Empty for rows not tied to an order.
    pub order_id: String,
    pub product_id: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        amount: f64,
        kind: LedgerEntryKind,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            amount,
            balance: 0.0,
            kind,
            order_id: order_id.into(),
            product_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Fills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillSide {
    Buy,
    Sell,
}

/// One execution against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub trade_id: i64,
    pub order_id: String,
    pub product_id: String,
    pub price: f64,
    pub size: f64,
    /// Fee charged in the quote currency.
    pub fee: f64,
    pub side: FillSide,
    pub created_at: DateTime<Utc>,
    pub settled: bool,
}

impl FillRecord {
    /// USD contributed by this fill: sell proceeds net of fee are positive,
    /// purchases including fee are negative.
    pub fn usd_value(&self) -> f64 {
        let gross = self.price * self.size;
        match self.side {
            FillSide::Sell => gross - self.fee,
            FillSide::Buy => -(gross + self.fee),
        }
    }
}

// ---------------------------------------------------------------------------
// Merged timeline
// ---------------------------------------------------------------------------

/// One entry of the merged timeline: exactly one payment or one ledger row.
#[derive(Debug, Clone, PartialEq)]
pub enum CombinedEvent {
    Payment(PaymentRecord),
    Ledger(LedgerEntry),
}

impl CombinedEvent {
    /// Ordering timestamp shared by both variants.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CombinedEvent::Payment(p) => p.time,
            CombinedEvent::Ledger(l) => l.created_at,
        }
    }

    pub fn is_payment(&self) -> bool {
        matches!(self, CombinedEvent::Payment(_))
    }
}

impl fmt::Display for CombinedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp().to_rfc3339();
        match self {
            CombinedEvent::Payment(p) => {
                write!(f, "{ts} payment pool={} amount={:.8}", p.pool, p.amount)
            }
            CombinedEvent::Ledger(l) => write!(
                f,
                "{ts} ledger amount={:.8} type={} order_id={}",
                l.amount,
                l.kind.as_str(),
                l.order_id
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A group of payouts paired with the orders that sold them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeTransaction {
    /// Stable hash of the contributing payment keys; re-emitting the same
    /// group yields the same key.
    pub idempotency_key: String,
    /// Timestamp of the last order in the group.
    pub time: DateTime<Utc>,
    pub product: String,
    pub mined_value: f64,
    pub exchange_value: f64,
    pub payments: Vec<PaymentRecord>,
    pub orders: Vec<LedgerEntry>,
}

impl fmt::Display for ExchangeTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exchange transaction {} product={} mined_value={:.6} exchange_value={:.6} payments={} orders={}",
            self.time.to_rfc3339(),
            self.product,
            self.mined_value,
            self.exchange_value,
            self.payments.len(),
            self.orders.len()
        )
    }
}

/// Transactions in discovery order.
pub type ExchangeLedger = Vec<ExchangeTransaction>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
