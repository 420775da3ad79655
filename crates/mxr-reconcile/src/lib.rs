//! mxr-reconcile
//!
//! Pairs mined payouts with the exchange orders that sold them.
//!
//! Stages, run strictly in sequence:
//! - merge: payments + exchange ledger rows → one chronological timeline
//! - scan: timeline → segments (payment run followed by order run)
//! - valuation: segment → priced `ExchangeTransaction`
//! - pipeline: persist the batch, then mark each contained payment
//!
//! The core logic (merge, scan, valuation) is pure apart from the fill
//! lookups, which go through the [`FillSource`] trait. All IO lives behind
//! the traits in [`sources`].

mod error;
pub mod merge;
mod pipeline;
pub mod scan;
pub mod sources;
pub mod valuation;

pub use error::{ReconcileError, ReconcileStage};
pub use merge::{build_timeline, earliest_payment_time, merge_events};
pub use pipeline::{PipelineConfig, ReconcilePipeline, RunReport};
pub use scan::{order_run, payment_run, scan_segments, Segment};
pub use sources::{FillPage, FillSource, LedgerSource, PaymentSource, ReconcileSink};
pub use valuation::{
    distinct_order_ids, exchange_value, group_time, idempotency_key, mined_value, order_usd_value,
    value_segment,
};
