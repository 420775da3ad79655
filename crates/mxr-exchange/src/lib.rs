//! mxr-exchange
//!
//! Coinbase Exchange (formerly GDAX) REST adapter. Implements the
//! reconciler's [`LedgerSource`] and [`FillSource`] traits.
//!
//! This crate does not know about payments or the database; it only reads
//! the account ledger and per-order fills.

mod auth;
mod wire;

pub use auth::sign;
pub use mxr_config::secrets::ExchangeCredentials;
pub use wire::WireAccount;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use mxr_reconcile::{FillPage, FillSource, LedgerSource};
use mxr_schemas::LedgerEntry;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use wire::{error_message, WireFill, WireLedgerEntry};

pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Largest page size the API accepts for ledger and fills.
pub const MAX_PAGE_LIMIT: usize = 100;

const CURSOR_HEADER: &str = "cb-after";
const USER_AGENT: &str = concat!("mxr/", env!("CARGO_PKG_VERSION"));

/// Base asset of a trading pair: `"ETH-USD"` → `"ETH"`.
pub fn base_currency(product: &str) -> Result<&str> {
    match product.split_once('-') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => Ok(base),
        _ => bail!("invalid product '{product}'. expected BASE-QUOTE, e.g. ETH-USD"),
    }
}

/// One decoded response plus the pagination cursor header.
struct Paged<T> {
    body: T,
    after: Option<String>,
}

/// Coinbase Exchange REST client.
///
/// Credentials are optional so public fixtures can be read unauthenticated;
/// ledger and fills endpoints reject unsigned requests in production.
#[derive(Debug, Clone)]
pub struct CoinbaseExchangeClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<ExchangeCredentials>,
    page_limit: usize,
}

impl CoinbaseExchangeClient {
    pub fn new(credentials: Option<ExchangeCredentials>, timeout: Duration) -> Result<Self> {
        Self::new_with_base_url(DEFAULT_BASE_URL.to_string(), credentials, timeout)
    }

    pub fn new_with_base_url(
        base_url: String,
        credentials: Option<ExchangeCredentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build exchange http client")?;
        Ok(Self {
            http,
            base_url,
            credentials,
            page_limit: MAX_PAGE_LIMIT,
        })
    }

    /// Override the page size (clamped to `1..=MAX_PAGE_LIMIT`).
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Url> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut url =
            reqwest::Url::parse(&raw).with_context(|| format!("invalid exchange url: {raw}"))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: reqwest::Url) -> Result<Paged<T>> {
        let request_path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        let mut req = self.http.get(url.clone());
        if let Some(creds) = &self.credentials {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign(&creds.api_secret, &timestamp, "GET", &request_path, "")?;
            req = req
                .header("CB-ACCESS-KEY", creds.api_key.as_str())
                .header("CB-ACCESS-SIGN", signature)
                .header("CB-ACCESS-TIMESTAMP", timestamp)
                .header("CB-ACCESS-PASSPHRASE", creds.passphrase.as_str());
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("exchange request failed: GET {request_path}"))?;

        let status = resp.status();
        let after = resp
            .headers()
            .get(CURSOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "exchange http error status={} path={} message={}",
                status.as_u16(),
                request_path,
                error_message(&body)
            );
        }

        let body: T = resp
            .json()
            .await
            .with_context(|| format!("exchange response json decode failed: GET {request_path}"))?;

        Ok(Paged { body, after })
    }

    pub async fn accounts(&self) -> Result<Vec<WireAccount>> {
        let url = self.endpoint("/accounts", &[])?;
        Ok(self.get_json::<Vec<WireAccount>>(url).await?.body)
    }

    /// Account holding `currency` (case-insensitive).
    pub async fn account_for_currency(&self, currency: &str) -> Result<WireAccount> {
        self.accounts()
            .await?
            .into_iter()
            .find(|a| a.currency.eq_ignore_ascii_case(currency))
            .ok_or_else(|| anyhow!("no exchange account for currency {currency}"))
    }

    /// One ledger page, newest first, plus the cursor for the next (older) page.
    pub async fn ledger_page(
        &self,
        account_id: &str,
        after: Option<&str>,
    ) -> Result<(Vec<LedgerEntry>, Option<String>)> {
        let limit = self.page_limit.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(a) = after {
            query.push(("after", a));
        }
        let url = self.endpoint(&format!("/accounts/{account_id}/ledger"), &query)?;
        let page = self.get_json::<Vec<WireLedgerEntry>>(url).await?;
        let entries = page
            .body
            .into_iter()
            .map(WireLedgerEntry::into_entry)
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, page.after))
    }
}

#[async_trait::async_trait]
impl LedgerSource for CoinbaseExchangeClient {
    /// Walks the base-currency account ledger from newest to oldest until
    /// it passes `since`, then returns the matching rows oldest first.
    ///
    /// Rows tagged with another product are dropped; rows without a product
    /// (transfers) are kept. A full page that has not yet reached `since`
    /// must carry a fresh cursor, otherwise the fetch fails instead of
    /// returning a truncated history.
    async fn fetch_since(&self, product: &str, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let currency = base_currency(product)?;
        let account = self
            .account_for_currency(currency)
            .await
            .with_context(|| format!("resolve ledger account for {product}"))?;

        let mut out: Vec<LedgerEntry> = Vec::new();
        let mut after: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        loop {
            let (page, next) = self
                .ledger_page(&account.id, after.as_deref())
                .await
                .with_context(|| format!("ledger page {} for account {}", pages + 1, account.id))?;
            pages += 1;

            let full_page = page.len() >= self.page_limit;
            let mut passed_since = false;
            for e in page {
                if e.created_at < since {
                    passed_since = true;
                    continue;
                }
                if e.product_id.as_deref().map_or(true, |p| p == product) {
                    out.push(e);
                }
            }

            if passed_since || !full_page {
                break;
            }
            // A full page still newer than `since` must lead somewhere older.
            match next {
                None => bail!(
                    "ledger page {pages} for account {} is full but has no {CURSOR_HEADER} cursor",
                    account.id
                ),
                Some(n) if !seen.insert(n.clone()) => bail!(
                    "ledger pagination for account {} repeated cursor {n}",
                    account.id
                ),
                Some(n) => after = Some(n),
            }
        }

        out.sort_by_key(|e| e.created_at);
        debug!(product, account_id = %account.id, pages, entries = out.len(), "ledger fetched");
        Ok(out)
    }
}

#[async_trait::async_trait]
impl FillSource for CoinbaseExchangeClient {
    async fn list_fills(&self, order_id: &str, cursor: Option<&str>) -> Result<FillPage> {
        let limit = self.page_limit.to_string();
        let mut query = vec![("order_id", order_id), ("limit", limit.as_str())];
        if let Some(c) = cursor {
            query.push(("after", c));
        }
        let url = self.endpoint("/fills", &query)?;
        let page = self.get_json::<Vec<WireFill>>(url).await?;

        let full_page = page.body.len() >= self.page_limit;
        let fills = page
            .body
            .into_iter()
            .map(WireFill::into_fill)
            .collect::<Result<Vec<_>>>()?;

        let has_more = full_page && page.after.is_some();
        Ok(FillPage {
            fills,
            has_more,
            next_cursor: if has_more { page.after } else { None },
        })
    }
}
