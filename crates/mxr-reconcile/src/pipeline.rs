//! Pipeline driver: merge → scan → valuate → persist → mark.
//!
//! One run is one sequential pass; no stage starts before the previous one
//! has consumed its whole input.

use mxr_schemas::{ExchangeLedger, PaymentKey};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::merge::build_timeline;
use crate::scan::scan_segments;
use crate::sources::{FillSource, LedgerSource, PaymentSource, ReconcileSink};
use crate::valuation::value_segment;

/// What to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Payment pool whose unprocessed payouts are read.
    pub pool: String,
    /// Trading pair whose exchange ledger is read (e.g. `ETH-USD`).
    pub product: String,
    /// Compute and report only; never call the sink.
    pub dry_run: bool,
}

impl PipelineConfig {
    pub fn new(pool: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            product: product.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pool: String,
    pub product: String,
    pub dry_run: bool,
    pub events_merged: usize,
    /// Payments left out of every transaction (retried next run).
    pub payments_unconsumed: usize,
    pub ledger: ExchangeLedger,
    /// Transactions newly written by the sink.
    pub persisted: u64,
    pub payments_marked: usize,
    /// Payments that were persisted inside a transaction but could not be
    /// marked processed.
    pub mark_failures: Vec<PaymentKey>,
}

impl RunReport {
    pub fn is_fully_marked(&self) -> bool {
        self.mark_failures.is_empty()
    }
}

/// Reconciler bound to its collaborators.
pub struct ReconcilePipeline<'a> {
    config: PipelineConfig,
    payments: &'a dyn PaymentSource,
    ledger: &'a dyn LedgerSource,
    fills: &'a dyn FillSource,
    sink: &'a dyn ReconcileSink,
}

impl<'a> ReconcilePipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        payments: &'a dyn PaymentSource,
        ledger: &'a dyn LedgerSource,
        fills: &'a dyn FillSource,
        sink: &'a dyn ReconcileSink,
    ) -> Self {
        Self {
            config,
            payments,
            ledger,
            fills,
            sink,
        }
    }

    /// Execute one reconcile run.
    ///
    /// Source and persistence failures are fatal and returned. Marking is
    /// best-effort per payment: failures are logged and listed in the report.
    pub async fn run(&self) -> Result<RunReport, ReconcileError> {
        let cfg = &self.config;
        info!(pool = %cfg.pool, product = %cfg.product, dry_run = cfg.dry_run, "reconcile run started");

        let timeline = build_timeline(self.payments, self.ledger, &cfg.pool, &cfg.product).await?;
        for ev in &timeline {
            debug!("{ev}");
        }

        let payments_total = timeline.iter().filter(|e| e.is_payment()).count();
        let segments = scan_segments(&timeline);
        let payments_grouped: usize = segments.iter().map(|s| s.payments.len()).sum();

        let mut ledger: ExchangeLedger = Vec::with_capacity(segments.len());
        for seg in &segments {
            let tx = value_segment(seg, &cfg.product, self.fills)
                .await
                .map_err(ReconcileError::fetch_fills)?;
            info!(key = %tx.idempotency_key, "{tx}");
            ledger.push(tx);
        }

        let mut report = RunReport {
            pool: cfg.pool.clone(),
            product: cfg.product.clone(),
            dry_run: cfg.dry_run,
            events_merged: timeline.len(),
            payments_unconsumed: payments_total - payments_grouped,
            ledger,
            persisted: 0,
            payments_marked: 0,
            mark_failures: Vec::new(),
        };

        if report.ledger.is_empty() {
            info!(
                events = report.events_merged,
                unconsumed = report.payments_unconsumed,
                "no complete transactions; nothing to persist"
            );
            return Ok(report);
        }
        if cfg.dry_run {
            info!(transactions = report.ledger.len(), "dry run; sink not called");
            return Ok(report);
        }

        report.persisted = self
            .sink
            .persist(&report.ledger)
            .await
            .map_err(ReconcileError::persist)?;

        for tx in &report.ledger {
            for p in &tx.payments {
                match self.sink.mark_processed(p).await {
                    Ok(()) => report.payments_marked += 1,
                    Err(e) => {
                        let cause = format!("{e:#}");
                        warn!(payment = %p.key(), error = %cause, "mark processed failed");
                        report.mark_failures.push(p.key());
                    }
                }
            }
        }

        info!(
            transactions = report.ledger.len(),
            persisted = report.persisted,
            marked = report.payments_marked,
            mark_failures = report.mark_failures.len(),
            unconsumed = report.payments_unconsumed,
            "reconcile run finished"
        );
        Ok(report)
    }
}
