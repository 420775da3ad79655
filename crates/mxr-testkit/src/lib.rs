//! mxr-testkit
//!
//! In-memory collaborators and fixture builders for reconcile scenarios.
//! Nothing here touches a database or the network.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use mxr_reconcile::{FillPage, FillSource, LedgerSource, PaymentSource, ReconcileSink};
use mxr_schemas::{
    ExchangeLedger, ExchangeTransaction, FillRecord, FillSide, LedgerEntry, LedgerEntryKind,
    PaymentKey, PaymentRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Base epoch for fixtures (2018-03-02T14:13:20Z).
pub const T0: i64 = 1_520_000_000;

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// `T0 + secs` as a UTC timestamp. Panics on an out-of-range fixture.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(T0 + secs, 0)
        .single()
        .expect("fixture timestamp out of range")
}

pub fn payment(pool: &str, secs: i64, amount: f64, usd_rate: f64) -> PaymentRecord {
    PaymentRecord::new(pool, ts(secs), amount, true, usd_rate)
}

pub fn trade(id: &str, secs: i64, order_id: &str) -> LedgerEntry {
    LedgerEntry::new(id, ts(secs), -1.0, LedgerEntryKind::Match, order_id)
}

pub fn transfer(id: &str, secs: i64) -> LedgerEntry {
    LedgerEntry::new(id, ts(secs), 1.0, LedgerEntryKind::Transfer, "")
}

pub fn sell_fill(order_id: &str, trade_id: i64, price: f64, size: f64, fee: f64) -> FillRecord {
    FillRecord {
        trade_id,
        order_id: order_id.to_string(),
        product_id: "ETH-USD".to_string(),
        price,
        size,
        fee,
        side: FillSide::Sell,
        created_at: ts(trade_id),
        settled: true,
    }
}

// ---------------------------------------------------------------------------
// Payment store + sink
// ---------------------------------------------------------------------------

/// Payment table and transaction table in one place, so a marked payment
/// disappears from the next `fetch_unprocessed` just like the real store.
#[derive(Default)]
pub struct InMemoryStore {
    payments: Mutex<Vec<(PaymentRecord, bool)>>,
    transactions: Mutex<BTreeMap<String, ExchangeTransaction>>,
    fail_mark: Mutex<HashSet<PaymentKey>>,
    fail_persist: AtomicBool,
    fetch_calls: AtomicUsize,
    persist_calls: AtomicUsize,
    mark_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new(payments: Vec<PaymentRecord>) -> Self {
        let store = Self::default();
        store.insert_payments(payments);
        store
    }

    pub fn insert_payments(&self, payments: Vec<PaymentRecord>) {
        let mut rows = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        rows.extend(payments.into_iter().map(|p| (p, false)));
    }

    /// Make `mark_processed` fail for `key` until [`Self::clear_mark_failures`].
    pub fn fail_mark_for(&self, key: PaymentKey) {
        self.fail_mark
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
    }

    pub fn clear_mark_failures(&self) {
        self.fail_mark
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub fn is_processed(&self, key: &PaymentKey) -> bool {
        self.payments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(p, done)| *done && &p.key() == key)
    }

    pub fn processed_count(&self) -> usize {
        self.payments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, done)| *done)
            .count()
    }

    /// Persisted transactions ordered by idempotency key.
    pub fn transactions(&self) -> Vec<ExchangeTransaction> {
        self.transactions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn mark_calls(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PaymentSource for InMemoryStore {
    async fn fetch_unprocessed(&self, pool: &str) -> Result<Vec<PaymentRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .iter()
            .filter(|(p, done)| !*done && p.pool == pool)
            .map(|(p, _)| p.clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl ReconcileSink for InMemoryStore {
    async fn persist(&self, ledger: &ExchangeLedger) -> Result<u64> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist.load(Ordering::SeqCst) {
            bail!("injected persist failure");
        }
        let mut txs = self.transactions.lock().unwrap_or_else(|e| e.into_inner());
        let mut inserted = 0u64;
        for tx in ledger {
            if !txs.contains_key(&tx.idempotency_key) {
                txs.insert(tx.idempotency_key.clone(), tx.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn mark_processed(&self, payment: &PaymentRecord) -> Result<()> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        let key = payment.key();
        if self
            .fail_mark
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
        {
            bail!("injected mark failure for {key}");
        }
        let mut rows = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        let row = rows
            .iter_mut()
            .find(|(p, _)| p.key() == key)
            .ok_or_else(|| anyhow!("unknown payment {key}"))?;
        row.1 = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exchange ledger
// ---------------------------------------------------------------------------

/// Fixed set of ledger entries, filtered by `since` on every call.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Vec<LedgerEntry>,
    fail: bool,
    calls: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            entries: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LedgerSource for InMemoryLedger {
    async fn fetch_since(&self, product: &str, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("injected ledger failure for {product}");
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| e.created_at >= since)
            .filter(|e| e.product_id.as_deref().map_or(true, |p| p == product))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fills
// ---------------------------------------------------------------------------

/// Fills served in fixed-size pages; the cursor is the next offset.
pub struct PagedFills {
    fills: HashMap<String, Vec<FillRecord>>,
    page_size: usize,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl PagedFills {
    pub fn new(page_size: usize) -> Self {
        Self {
            fills: HashMap::new(),
            page_size: page_size.max(1),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fills(mut self, fills: Vec<FillRecord>) -> Self {
        for f in fills {
            self.fills.entry(f.order_id.clone()).or_default().push(f);
        }
        self
    }

    /// Every page request for `order_id` fails.
    pub fn failing_for(mut self, order_id: &str) -> Self {
        self.failing.insert(order_id.to_string());
        self
    }

    /// `(order_id, cursor)` of every request, in call order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_for(&self, order_id: &str) -> usize {
        self.calls().iter().filter(|(id, _)| id == order_id).count()
    }
}

#[async_trait::async_trait]
impl FillSource for PagedFills {
    async fn list_fills(&self, order_id: &str, cursor: Option<&str>) -> Result<FillPage> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((order_id.to_string(), cursor.map(str::to_string)));

        if self.failing.contains(order_id) {
            bail!("injected fill failure for {order_id}");
        }

        let start: usize = match cursor {
            None => 0,
            Some(c) => c.parse().map_err(|_| anyhow!("bad cursor {c}"))?,
        };
        let all = self.fills.get(order_id).map(Vec::as_slice).unwrap_or(&[]);
        let end = (start + self.page_size).min(all.len());
        let page = all.get(start..end).unwrap_or(&[]).to_vec();
        let has_more = end < all.len();

        Ok(FillPage {
            fills: page,
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }
}
