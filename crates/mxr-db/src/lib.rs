use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use mxr_reconcile::{PaymentSource, ReconcileSink};
use mxr_schemas::{ExchangeLedger, ExchangeTransaction, LedgerEntry, PaymentRecord};
use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

pub const ENV_DB_URL: &str = "MXR_DATABASE_URL";

/// Connect to Postgres using MXR_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

/// Connect to an already-resolved Postgres URL.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_payments_table: bool,
    pub has_exchange_transactions_table: bool,
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name=$1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed: {table}"))?;
    Ok(exists)
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_payments_table: table_exists(pool, "payments").await?,
        has_exchange_transactions_table: table_exists(pool, "exchange_transactions").await?,
    })
}

fn from_epoch_secs(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| anyhow!("payment time out of range: {secs}"))
}

/// Insert one payment row (used by ingest tooling and tests).
/// An existing (pool, time) row is left untouched.
pub async fn insert_payment(pool: &PgPool, p: &PaymentRecord) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into payments (pool, time, amount, receipt, usd)
        values ($1, $2, $3, $4, $5)
        on conflict (pool, time) do nothing
        "#,
    )
    .bind(&p.pool)
    .bind(p.time.timestamp())
    .bind(p.amount)
    .bind(p.receipt)
    .bind(p.usd_rate)
    .execute(pool)
    .await
    .context("insert_payment failed")?;

    Ok(res.rows_affected() == 1)
}

/// Payments for `pool_name` that have not been reconciled yet (`x_usd is null`).
pub async fn fetch_unprocessed_payments(pool: &PgPool, pool_name: &str) -> Result<Vec<PaymentRecord>> {
    let rows = sqlx::query(
        r#"
        select pool, time, amount, receipt, usd
        from payments
        where pool = $1
          and x_usd is null
        order by time asc
        "#,
    )
    .bind(pool_name)
    .fetch_all(pool)
    .await
    .context("fetch_unprocessed_payments failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let secs: i64 = row.try_get("time")?;
        out.push(PaymentRecord {
            pool: row.try_get("pool")?,
            time: from_epoch_secs(secs)?,
            amount: row.try_get("amount")?,
            receipt: row.try_get("receipt")?,
            usd_rate: row.try_get("usd")?,
        });
    }
    Ok(out)
}

/// Count of unprocessed payments for `pool_name`.
pub async fn count_unprocessed_payments(pool: &PgPool, pool_name: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from payments
        where pool = $1
          and x_usd is null
        "#,
    )
    .bind(pool_name)
    .fetch_one(pool)
    .await
    .context("count_unprocessed_payments failed")?;
    Ok(n)
}

/// Set `x_usd = true` on one payment. Errors if no row matched.
pub async fn mark_payment_processed(pool: &PgPool, p: &PaymentRecord) -> Result<()> {
    let res = sqlx::query(
        r#"
        update payments
        set x_usd = true
        where pool = $1
          and time = $2
        "#,
    )
    .bind(&p.pool)
    .bind(p.time.timestamp())
    .execute(pool)
    .await
    .context("mark_payment_processed update failed")?;

    if res.rows_affected() == 0 {
        return Err(anyhow!("mark_payment_processed: no payment {}", p.key()));
    }
    Ok(())
}

/// Insert a batch of transactions in one database transaction.
///
/// Rows whose idempotency key already exists are skipped. Returns the
/// number of newly inserted rows.
pub async fn insert_exchange_transactions(pool: &PgPool, ledger: &ExchangeLedger) -> Result<u64> {
    let mut tx = pool.begin().await.context("begin persist tx failed")?;
    let mut inserted = 0u64;

    for t in ledger {
        let payments = serde_json::to_value(&t.payments).context("encode payments json")?;
        let orders = serde_json::to_value(&t.orders).context("encode orders json")?;

        let res = sqlx::query(
            r#"
            insert into exchange_transactions (
              idempotency_key, time, product, mined_value, exchange_value, payments, orders
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            on conflict (idempotency_key) do nothing
            "#,
        )
        .bind(&t.idempotency_key)
        .bind(t.time)
        .bind(&t.product)
        .bind(t.mined_value)
        .bind(t.exchange_value)
        .bind(payments)
        .bind(orders)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert exchange_transaction {} failed", t.idempotency_key))?;

        inserted += res.rows_affected();
    }

    tx.commit().await.context("commit persist tx failed")?;
    Ok(inserted)
}

/// Stored transactions for `product`, oldest first.
pub async fn fetch_exchange_transactions(pool: &PgPool, product: &str) -> Result<ExchangeLedger> {
    let rows = sqlx::query(
        r#"
        select idempotency_key, time, product, mined_value, exchange_value, payments, orders
        from exchange_transactions
        where product = $1
        order by time asc, idempotency_key asc
        "#,
    )
    .bind(product)
    .fetch_all(pool)
    .await
    .context("fetch_exchange_transactions failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let key: String = row.try_get("idempotency_key")?;
        let payments: Vec<PaymentRecord> =
            serde_json::from_value(row.try_get("payments")?)
                .with_context(|| format!("decode payments json for {key}"))?;
        let orders: Vec<LedgerEntry> = serde_json::from_value(row.try_get("orders")?)
            .with_context(|| format!("decode orders json for {key}"))?;
        out.push(ExchangeTransaction {
            time: row.try_get("time")?,
            product: row.try_get("product")?,
            mined_value: row.try_get("mined_value")?,
            exchange_value: row.try_get("exchange_value")?,
            payments,
            orders,
            idempotency_key: key,
        });
    }
    Ok(out)
}

/// Postgres-backed payment source and reconcile sink.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl PaymentSource for PgStore {
    async fn fetch_unprocessed(&self, pool: &str) -> Result<Vec<PaymentRecord>> {
        fetch_unprocessed_payments(&self.pool, pool).await
    }
}

#[async_trait::async_trait]
impl ReconcileSink for PgStore {
    async fn persist(&self, ledger: &ExchangeLedger) -> Result<u64> {
        let inserted = insert_exchange_transactions(&self.pool, ledger).await?;
        debug!(batch = ledger.len(), inserted, "exchange transactions persisted");
        Ok(inserted)
    }

    async fn mark_processed(&self, payment: &PaymentRecord) -> Result<()> {
        mark_payment_processed(&self.pool, payment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_secs_round_trip() {
        let t = from_epoch_secs(1_520_000_000).unwrap();
        assert_eq!(t.timestamp(), 1_520_000_000);
    }
}
