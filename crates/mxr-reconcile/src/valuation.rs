//! USD valuation of segments.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use mxr_schemas::{ExchangeTransaction, FillRecord, LedgerEntry, PaymentRecord};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::scan::Segment;
use crate::sources::FillSource;

/// Σ `amount × usd_rate` over the payments.
pub fn mined_value(payments: &[PaymentRecord]) -> f64 {
    payments.iter().map(PaymentRecord::usd_value).sum()
}

/// Distinct order ids in first-appearance order. Rows without an order id
/// are left out.
pub fn distinct_order_ids(orders: &[LedgerEntry]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for o in orders {
        if o.order_id.is_empty() {
            warn!(ledger_id = %o.id, "ledger entry without order_id; not valued");
            continue;
        }
        if !out.iter().any(|id| id == &o.order_id) {
            out.push(o.order_id.clone());
        }
    }
    out
}

/// Timestamp of the last order; `Utc::now()` for an empty slice.
pub fn group_time(orders: &[LedgerEntry]) -> DateTime<Utc> {
    orders.last().map(|o| o.created_at).unwrap_or_else(Utc::now)
}

/// Page through every fill of `order_id` and sum their USD contribution.
///
/// Any page error aborts the sum. A page that claims more results without a
/// cursor, or with any cursor already followed, is rejected.
pub async fn order_usd_value(fills: &dyn FillSource, order_id: &str) -> Result<f64> {
    let mut sum = 0.0;
    let mut pages = 0usize;
    let mut cursor: Option<String> = None;
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        let page = fills
            .list_fills(order_id, cursor.as_deref())
            .await
            .with_context(|| format!("list fills failed for order_id={order_id}"))?;
        pages += 1;
        sum += page.fills.iter().map(FillRecord::usd_value).sum::<f64>();

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            None => bail!("fill page for order_id={order_id} has_more without next_cursor"),
            Some(next) if !seen.insert(next.clone()) => {
                bail!("fill pagination for order_id={order_id} repeated cursor {next}")
            }
            Some(next) => cursor = Some(next),
        }
    }

    debug!(order_id, pages, usd = sum, "order valued");
    Ok(sum)
}

/// Σ over the distinct order ids of each order's fill value. Divergent ids
/// inside one group are each valued on their own.
pub async fn exchange_value(fills: &dyn FillSource, orders: &[LedgerEntry]) -> Result<f64> {
    let mut total = 0.0;
    for id in distinct_order_ids(orders) {
        total += order_usd_value(fills, &id).await?;
    }
    Ok(total)
}

/// Stable key for a group: SHA-256 over its sorted payment keys.
pub fn idempotency_key(payments: &[PaymentRecord]) -> String {
    let mut keys: Vec<String> = payments.iter().map(|p| p.key().to_string()).collect();
    keys.sort();
    let mut hasher = Sha256::new();
    hasher.update(keys.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Turn a segment into a priced exchange transaction.
pub async fn value_segment(
    segment: &Segment,
    product: &str,
    fills: &dyn FillSource,
) -> Result<ExchangeTransaction> {
    let exchange_value = exchange_value(fills, &segment.orders).await?;
    Ok(ExchangeTransaction {
        idempotency_key: idempotency_key(&segment.payments),
        time: group_time(&segment.orders),
        product: product.to_string(),
        mined_value: mined_value(&segment.payments),
        exchange_value,
        payments: segment.payments.clone(),
        orders: segment.orders.clone(),
    })
}
