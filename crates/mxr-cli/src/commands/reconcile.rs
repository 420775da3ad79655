//! `mxr reconcile`: wire config, Postgres and the exchange client into one
//! pipeline run and print the report.

use anyhow::{Context, Result};
use mxr_config::secrets::resolve_secrets;
use mxr_config::{report_unused_keys, UnusedKeyPolicy};
use mxr_db::PgStore;
use mxr_exchange::{base_currency, CoinbaseExchangeClient};
use mxr_reconcile::{PipelineConfig, ReconcilePipeline, RunReport};
use std::time::Duration;
use tracing::{info, warn};

use super::{load_config, pick};

pub struct ReconcileArgs {
    pub pool: Option<String>,
    pub product: Option<String>,
    pub config_paths: Vec<String>,
    pub dry_run: bool,
    pub json: bool,
}

pub async fn run(args: ReconcileArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths)?;
    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for p in unused.unused_leaf_pointers.iter().take(50) {
        warn!(pointer = %p, "unused config key");
    }
    let cfg = loaded.typed()?;

    let pool = pick(args.pool, cfg.reconcile.pool.clone(), "pool")?;
    let product = pick(args.product, cfg.reconcile.product.clone(), "product")?;
    base_currency(&product)?;

    let secrets = resolve_secrets(&cfg);
    let database_url = secrets.require_database_url()?;
    let credentials = secrets.require_exchange()?;

    let db = mxr_db::connect(&database_url).await?;
    let store = PgStore::new(db);

    let client = CoinbaseExchangeClient::new_with_base_url(
        cfg.exchange.base_url.clone(),
        Some(credentials),
        Duration::from_secs(cfg.exchange.timeout_secs),
    )?
    .with_page_limit(cfg.exchange.page_limit);

    info!(
        pool = %pool,
        product = %product,
        dry_run = args.dry_run,
        config_hash = %loaded.config_hash,
        "reconcile starting"
    );

    let report = ReconcilePipeline::new(
        PipelineConfig::new(pool, product).dry_run(args.dry_run),
        &store,
        &client,
        &client,
        &store,
    )
    .run()
    .await?;

    print_report(&report, args.json)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let s = serde_json::to_string_pretty(report).context("report json serialize failed")?;
        println!("{s}");
        return Ok(());
    }

    println!("pool={}", report.pool);
    println!("product={}", report.product);
    println!("dry_run={}", report.dry_run);
    println!("events_merged={}", report.events_merged);
    println!("transactions={}", report.ledger.len());
    println!("persisted={}", report.persisted);
    println!("payments_marked={}", report.payments_marked);
    println!("payments_unconsumed={}", report.payments_unconsumed);
    for tx in &report.ledger {
        println!("{tx}");
    }
    for key in &report.mark_failures {
        println!("mark_failed={key}");
    }
    Ok(())
}
