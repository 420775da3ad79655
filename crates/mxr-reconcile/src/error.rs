use std::fmt;

/// Pipeline stage at which a run failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileStage {
    FetchPayments,
    FetchLedger,
    FetchFills,
    Persist,
}

impl ReconcileStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStage::FetchPayments => "fetch_payments",
            ReconcileStage::FetchLedger => "fetch_ledger",
            ReconcileStage::FetchFills => "fetch_fills",
            ReconcileStage::Persist => "persist",
        }
    }
}

/// Fatal error for one reconcile run.
///
/// Mark-processed failures are not represented here: they are per-payment,
/// best-effort, and reported through `RunReport::mark_failures`.
#[derive(Debug)]
pub struct ReconcileError {
    pub stage: ReconcileStage,
    pub cause: anyhow::Error,
}

impl ReconcileError {
    pub fn new(stage: ReconcileStage, cause: anyhow::Error) -> Self {
        Self { stage, cause }
    }

    pub fn fetch_payments(cause: anyhow::Error) -> Self {
        Self::new(ReconcileStage::FetchPayments, cause)
    }

    pub fn fetch_ledger(cause: anyhow::Error) -> Self {
        Self::new(ReconcileStage::FetchLedger, cause)
    }

    pub fn fetch_fills(cause: anyhow::Error) -> Self {
        Self::new(ReconcileStage::FetchFills, cause)
    }

    pub fn persist(cause: anyhow::Error) -> Self {
        Self::new(ReconcileStage::Persist, cause)
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reconcile failed at stage={}: {:#}",
            self.stage.as_str(),
            self.cause
        )
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}
