//! Event merger: one chronological timeline from payments + ledger rows.

use chrono::{DateTime, Utc};
use mxr_schemas::{CombinedEvent, LedgerEntry, PaymentRecord};
use tracing::debug;

use crate::error::ReconcileError;
use crate::sources::{LedgerSource, PaymentSource};

/// Earliest payout time in the batch. The store does not return payments
/// sorted, so this is a true minimum rather than the first element.
pub fn earliest_payment_time(payments: &[PaymentRecord]) -> Option<DateTime<Utc>> {
    payments.iter().map(|p| p.time).min()
}

/// Interleave payments and ledger rows ascending by timestamp.
///
/// The sort is stable and payments are pushed first, so on equal timestamps
/// payments precede ledger rows and each source keeps its own order.
pub fn merge_events(payments: Vec<PaymentRecord>, entries: Vec<LedgerEntry>) -> Vec<CombinedEvent> {
    let mut events: Vec<CombinedEvent> = Vec::with_capacity(payments.len() + entries.len());
    events.extend(payments.into_iter().map(CombinedEvent::Payment));
    events.extend(entries.into_iter().map(CombinedEvent::Ledger));
    events.sort_by_key(|e| e.timestamp());
    events
}

/// Fetch both streams and merge them.
///
/// With no unprocessed payments this returns an empty timeline without
/// calling the ledger source.
pub async fn build_timeline(
    payments: &dyn PaymentSource,
    ledger: &dyn LedgerSource,
    pool: &str,
    product: &str,
) -> Result<Vec<CombinedEvent>, ReconcileError> {
    let unprocessed = payments
        .fetch_unprocessed(pool)
        .await
        .map_err(ReconcileError::fetch_payments)?;

    let Some(since) = earliest_payment_time(&unprocessed) else {
        debug!(pool, "no unprocessed payments; skipping ledger fetch");
        return Ok(Vec::new());
    };

    let entries = ledger
        .fetch_since(product, since)
        .await
        .map_err(ReconcileError::fetch_ledger)?;

    debug!(
        pool,
        product,
        payments = unprocessed.len(),
        ledger_entries = entries.len(),
        since = %since.to_rfc3339(),
        "merging streams"
    );

    Ok(merge_events(unprocessed, entries))
}
