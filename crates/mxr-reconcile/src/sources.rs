//! Collaborator boundary for the reconciler.
//!
//! These traits are the only way the pipeline reaches the payment store,
//! the exchange, or the output store. Concrete implementations live in
//! `mxr-db` (Postgres) and `mxr-exchange` (Coinbase Exchange REST); the
//! in-memory fakes used by tests live in `mxr-testkit`.
//!
//! All traits are object-safe so the pipeline can hold `&dyn` handles.

use anyhow::Result;
use chrono::{DateTime, Utc};
use mxr_schemas::{ExchangeLedger, FillRecord, LedgerEntry, PaymentRecord};

/// Source of payouts that have no exchange valuation yet.
#[async_trait::async_trait]
pub trait PaymentSource: Send + Sync {
    /// Unprocessed payments for `pool`, in source order (not guaranteed
    /// sorted by time).
    async fn fetch_unprocessed(&self, pool: &str) -> Result<Vec<PaymentRecord>>;
}

/// Source of exchange ledger rows.
#[async_trait::async_trait]
pub trait LedgerSource: Send + Sync {
    /// All ledger entries for `product` created at or after `since`.
    async fn fetch_since(&self, product: &str, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>>;
}

/// One page of fills for an order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillPage {
    pub fills: Vec<FillRecord>,
    pub has_more: bool,
    /// Cursor to pass back for the next page. Required when `has_more`.
    pub next_cursor: Option<String>,
}

/// Paginated source of per-order fills.
#[async_trait::async_trait]
pub trait FillSource: Send + Sync {
    /// Fetch one page of fills for `order_id`. `cursor` is `None` for the
    /// first page and the previous page's `next_cursor` afterwards.
    async fn list_fills(&self, order_id: &str, cursor: Option<&str>) -> Result<FillPage>;
}

/// Output store for computed transactions.
#[async_trait::async_trait]
pub trait ReconcileSink: Send + Sync {
    /// Persist the whole batch. Returns how many transactions were newly
    /// written (already-known idempotency keys are skipped).
    async fn persist(&self, ledger: &ExchangeLedger) -> Result<u64>;

    /// Mark one payment as reconciled so it is not fetched again.
    async fn mark_processed(&self, payment: &PaymentRecord) -> Result<()>;
}
