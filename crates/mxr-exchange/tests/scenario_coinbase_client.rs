//! Scenario: Coinbase Exchange adapter against a local mock server.
//!
//! No real network access; every endpoint is served by httpmock.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use mxr_exchange::{CoinbaseExchangeClient, ExchangeCredentials};
use mxr_reconcile::{FillSource, LedgerSource};
use mxr_schemas::LedgerEntryKind;
use serde_json::json;

fn creds() -> ExchangeCredentials {
    ExchangeCredentials {
        api_key: "test-key".to_string(),
        // base64("secret")
        api_secret: "c2VjcmV0".to_string(),
        passphrase: "test-pass".to_string(),
    }
}

fn client(server: &MockServer, page_limit: usize) -> CoinbaseExchangeClient {
    CoinbaseExchangeClient::new_with_base_url(server.base_url(), Some(creds()), Duration::from_secs(5))
        .unwrap()
        .with_page_limit(page_limit)
}

fn fill(trade_id: i64, price: &str, size: &str) -> serde_json::Value {
    json!({
        "trade_id": trade_id,
        "product_id": "ETH-USD",
        "order_id": "ord-1",
        "price": price,
        "size": size,
        "fee": "0.00",
        "side": "sell",
        "created_at": "2018-03-02T14:18:20Z",
        "liquidity": "T",
        "settled": true
    })
}

#[tokio::test]
async fn full_fill_page_with_cursor_header_reports_more() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/fills")
                .query_param("order_id", "ord-1")
                .query_param("limit", "2")
                .header("CB-ACCESS-KEY", "test-key")
                .header("CB-ACCESS-PASSPHRASE", "test-pass")
                .header_exists("CB-ACCESS-SIGN")
                .header_exists("CB-ACCESS-TIMESTAMP");
            then.status(200)
                .header("cb-after", "c-2")
                .json_body(json!([fill(1, "800.00", "0.5"), fill(2, "810.00", "0.25")]));
        })
        .await;

    let page = client(&server, 2).list_fills("ord-1", None).await.unwrap();

    m.assert_async().await;
    assert_eq!(page.fills.len(), 2);
    assert!(page.has_more);
    assert_eq!(page.next_cursor.as_deref(), Some("c-2"));
    let usd: f64 = page.fills.iter().map(|f| f.usd_value()).sum();
    assert!((usd - (400.0 + 202.5)).abs() < 1e-9);
}

#[tokio::test]
async fn cursor_is_forwarded_and_short_page_ends_pagination() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/fills")
                .query_param("order_id", "ord-1")
                .query_param("after", "c-2");
            then.status(200)
                .header("cb-after", "c-3")
                .json_body(json!([fill(3, "820.00", "0.1")]));
        })
        .await;

    let page = client(&server, 2)
        .list_fills("ord-1", Some("c-2"))
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(page.fills.len(), 1);
    assert!(!page.has_more);
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn ledger_is_filtered_by_since_and_product_and_returned_oldest_first() {
    let server = MockServer::start_async().await;
    let accounts = server
        .mock_async(|when, then| {
            when.method(GET).path("/accounts");
            then.status(200).json_body(json!([
                {"id": "acc-usd", "currency": "USD", "balance": "10.00"},
                {"id": "acc-eth", "currency": "ETH", "balance": "1.50"}
            ]));
        })
        .await;
    let ledger = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/accounts/acc-eth/ledger")
                .query_param("limit", "3");
            then.status(200).header("cb-after", "900").json_body(json!([
                {"id": "4", "created_at": "2018-03-02T14:18:20Z", "amount": "-0.5", "balance": "1.0",
                 "type": "match", "details": {"order_id": "ord-1", "product_id": "ETH-USD"}},
                {"id": "3", "created_at": "2018-03-02T14:17:30Z", "amount": "-0.1", "balance": "1.5",
                 "type": "match", "details": {"order_id": "ord-x", "product_id": "ETH-BTC"}},
                {"id": "2", "created_at": "2018-03-02T14:16:40Z", "amount": "1.6", "balance": "1.6",
                 "type": "transfer", "details": {}},
                {"id": "1", "created_at": "2018-03-02T14:14:10Z", "amount": "-2.0", "balance": "0.0",
                 "type": "match", "details": {"order_id": "ord-0", "product_id": "ETH-USD"}}
            ]));
        })
        .await;

    let since = Utc.timestamp_opt(1_520_000_100, 0).unwrap();
    let entries = client(&server, 3)
        .fetch_since("ETH-USD", since)
        .await
        .unwrap();

    accounts.assert_async().await;
    // The oldest row is past `since`, so no second page is requested.
    ledger.assert_hits_async(1).await;

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "4"]);
    assert_eq!(entries[0].kind, LedgerEntryKind::Transfer);
    assert_eq!(entries[1].order_id, "ord-1");
}

#[tokio::test]
async fn missing_base_currency_account_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/accounts");
            then.status(200)
                .json_body(json!([{"id": "acc-usd", "currency": "USD"}]));
        })
        .await;

    let since = Utc.timestamp_opt(1_520_000_000, 0).unwrap();
    let err = client(&server, 3)
        .fetch_since("ETH-USD", since)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("no exchange account for currency ETH"));
}

#[tokio::test]
async fn http_error_surfaces_status_and_exchange_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/fills");
            then.status(401)
                .json_body(json!({"message": "invalid signature"}));
        })
        .await;

    let err = client(&server, 100)
        .list_fills("ord-1", None)
        .await
        .unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("status=401"), "{msg}");
    assert!(msg.contains("invalid signature"), "{msg}");
}

#[tokio::test]
async fn full_ledger_page_without_cursor_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/accounts");
            then.status(200)
                .json_body(json!([{"id": "acc-eth", "currency": "ETH"}]));
        })
        .await;
    let ledger = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/accounts/acc-eth/ledger")
                .query_param("limit", "2");
            // Both rows are newer than `since`, the page is full, and there
            // is no cb-after header to reach the older rows.
            then.status(200).json_body(json!([
                {"id": "6", "created_at": "2018-03-02T14:20:00Z", "amount": "-0.5", "balance": "1.0",
                 "type": "match", "details": {"order_id": "ord-2", "product_id": "ETH-USD"}},
                {"id": "5", "created_at": "2018-03-02T14:19:00Z", "amount": "-0.5", "balance": "1.5",
                 "type": "match", "details": {"order_id": "ord-1", "product_id": "ETH-USD"}}
            ]));
        })
        .await;

    let since = Utc.timestamp_opt(1_520_000_000, 0).unwrap();
    let err = client(&server, 2)
        .fetch_since("ETH-USD", since)
        .await
        .unwrap_err();

    ledger.assert_hits_async(1).await;
    let msg = format!("{err:#}");
    assert!(msg.contains("no cb-after cursor"), "{msg}");
}
