//! Segment scanner: partitions the merged timeline into payment/order groups.
//!
//! Each step takes a run of payments starting at the cursor, then the run of
//! non-transfer ledger rows that follows it. A step that finds either run
//! empty ends the scan; whatever is left (dangling payments, orders before
//! any payment, trailing transfers) stays unconsumed for the next run.

use mxr_schemas::{CombinedEvent, LedgerEntry, PaymentRecord};

/// One transaction candidate: payouts and the orders that followed them.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub payments: Vec<PaymentRecord>,
    pub orders: Vec<LedgerEntry>,
}

/// Maximal run of payments starting at `start`.
///
/// Returns the run and the index of the first non-payment event, or
/// `events.len()` when the run reaches the end of input.
pub fn payment_run(events: &[CombinedEvent], start: usize) -> (Vec<PaymentRecord>, usize) {
    let mut run = Vec::new();
    for (i, ev) in events.iter().enumerate().skip(start) {
        match ev {
            CombinedEvent::Payment(p) => run.push(p.clone()),
            CombinedEvent::Ledger(_) => return (run, i),
        }
    }
    (run, events.len())
}

/// Run of non-transfer ledger rows starting at `start`.
///
/// Transfers are skipped without ending the run. The run ends at the first
/// payment, whose index is returned. If input runs out first, the returned
/// index is that of the last accepted order (`None` when nothing was
/// accepted), so trailing transfers are never consumed.
pub fn order_run(events: &[CombinedEvent], start: usize) -> (Vec<LedgerEntry>, Option<usize>) {
    let mut run = Vec::new();
    let mut last_accepted = None;
    for (i, ev) in events.iter().enumerate().skip(start) {
        match ev {
            CombinedEvent::Payment(_) => return (run, Some(i)),
            CombinedEvent::Ledger(l) if l.kind.is_transfer() => continue,
            CombinedEvent::Ledger(l) => {
                last_accepted = Some(i);
                run.push(l.clone());
            }
        }
    }
    (run, last_accepted)
}

/// Walk the timeline left to right and collect every complete segment.
///
/// Every emitting step moves the cursor strictly forward, so the scan
/// performs at most `events.len()` steps.
pub fn scan_segments(events: &[CombinedEvent]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut i = 0usize;

    while i < events.len() {
        let (payments, next) = payment_run(events, i);
        if payments.is_empty() {
            break;
        }

        let (orders, next2) = order_run(events, next);
        let Some(next2) = next2.filter(|_| !orders.is_empty()) else {
            break;
        };

        debug_assert!(next2 > i, "scan cursor must advance");
        segments.push(Segment { payments, orders });
        i = next2;
    }

    segments
}
