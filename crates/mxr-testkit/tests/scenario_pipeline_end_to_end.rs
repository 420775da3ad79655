//! Scenario: full reconcile run against in-memory collaborators.
//!
//! merge → scan → valuate → persist → mark, checked from the outside.

use mxr_reconcile::{PipelineConfig, ReconcilePipeline};
use mxr_testkit::*;

const POOL: &str = "ethermine";
const PRODUCT: &str = "ETH-USD";

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn two_payments_and_one_order_become_one_marked_transaction() {
    let store = InMemoryStore::new(vec![
        payment(POOL, 10, 0.5, 800.0),
        payment(POOL, 20, 0.25, 820.0),
    ]);
    let ledger = InMemoryLedger::new(vec![trade("L1", 30, "ord-1")]);
    let fills = PagedFills::new(100).with_fills(vec![
        sell_fill("ord-1", 1, 810.0, 0.5, 1.0),
        sell_fill("ord-1", 2, 812.0, 0.25, 0.5),
    ]);

    let pipeline = ReconcilePipeline::new(
        PipelineConfig::new(POOL, PRODUCT),
        &store,
        &ledger,
        &fills,
        &store,
    );
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.events_merged, 3);
    assert_eq!(report.ledger.len(), 1);
    let tx = &report.ledger[0];
    assert_eq!(tx.product, PRODUCT);
    assert_eq!(tx.time, ts(30));
    assert_eq!(tx.payments.len(), 2);
    assert_eq!(tx.orders.len(), 1);
    assert!(approx(tx.mined_value, 0.5 * 800.0 + 0.25 * 820.0));
    assert!(approx(tx.exchange_value, (810.0 * 0.5 - 1.0) + (812.0 * 0.25 - 0.5)));

    assert_eq!(report.persisted, 1);
    assert_eq!(report.payments_marked, 2);
    assert!(report.is_fully_marked());
    assert_eq!(store.processed_count(), 2);
    assert_eq!(store.transactions().len(), 1);
}

#[tokio::test]
async fn no_unprocessed_payments_never_calls_the_ledger() {
    let store = InMemoryStore::new(vec![payment("other-pool", 10, 1.0, 1.0)]);
    let ledger = InMemoryLedger::new(vec![trade("L1", 30, "ord-1")]);
    let fills = PagedFills::new(100);

    let report = ReconcilePipeline::new(
        PipelineConfig::new(POOL, PRODUCT),
        &store,
        &ledger,
        &fills,
        &store,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.events_merged, 0);
    assert!(report.ledger.is_empty());
    assert_eq!(ledger.calls(), 0);
    assert!(fills.calls().is_empty());
    assert_eq!(store.persist_calls(), 0);
}

#[tokio::test]
async fn dangling_payment_is_never_marked() {
    let p1 = payment(POOL, 10, 1.0, 1.0);
    let store = InMemoryStore::new(vec![p1.clone()]);
    let ledger = InMemoryLedger::new(vec![transfer("T1", 20)]);
    let fills = PagedFills::new(100);

    let report = ReconcilePipeline::new(
        PipelineConfig::new(POOL, PRODUCT),
        &store,
        &ledger,
        &fills,
        &store,
    )
    .run()
    .await
    .unwrap();

    assert!(report.ledger.is_empty());
    assert_eq!(report.payments_unconsumed, 1);
    assert_eq!(store.mark_calls(), 0);
    assert!(!store.is_processed(&p1.key()));
}

#[tokio::test]
async fn two_order_ids_in_one_group_are_valued_independently() {
    let store = InMemoryStore::new(vec![payment(POOL, 10, 1.0, 100.0)]);
    let ledger = InMemoryLedger::new(vec![
        trade("L1", 20, "ord-a"),
        trade("L2", 21, "ord-b"),
        trade("L3", 22, "ord-a"),
    ]);
    // Page size 1 forces pagination on ord-a.
    let fills = PagedFills::new(1).with_fills(vec![
        sell_fill("ord-a", 1, 100.0, 0.4, 0.0),
        sell_fill("ord-a", 2, 100.0, 0.1, 0.0),
        sell_fill("ord-b", 3, 101.0, 0.5, 0.0),
    ]);

    let report = ReconcilePipeline::new(
        PipelineConfig::new(POOL, PRODUCT),
        &store,
        &ledger,
        &fills,
        &store,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.ledger.len(), 1);
    assert!(approx(report.ledger[0].exchange_value, 40.0 + 10.0 + 50.5));
    // Each distinct id is paged once through: ord-a twice (2 fills), ord-b once.
    assert_eq!(fills.calls_for("ord-a"), 2);
    assert_eq!(fills.calls_for("ord-b"), 1);
    assert_eq!(report.ledger[0].time, ts(22));
}

#[tokio::test]
async fn two_groups_are_persisted_in_one_batch_in_timeline_order() {
    let store = InMemoryStore::new(vec![
        payment(POOL, 30, 1.0, 1.0),
        payment(POOL, 10, 1.0, 1.0),
    ]);
    let ledger = InMemoryLedger::new(vec![trade("L1", 20, "ord-1"), trade("L2", 40, "ord-2")]);
    let fills = PagedFills::new(10).with_fills(vec![
        sell_fill("ord-1", 1, 1.0, 1.0, 0.0),
        sell_fill("ord-2", 2, 2.0, 1.0, 0.0),
    ]);

    let report = ReconcilePipeline::new(
        PipelineConfig::new(POOL, PRODUCT),
        &store,
        &ledger,
        &fills,
        &store,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.ledger.len(), 2);
    assert_eq!(report.ledger[0].time, ts(20));
    assert_eq!(report.ledger[1].time, ts(40));
    assert_eq!(store.persist_calls(), 1);
    assert_eq!(report.persisted, 2);
    assert_eq!(store.processed_count(), 2);
}
