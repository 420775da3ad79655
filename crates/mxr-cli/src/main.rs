use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mxr")]
#[command(about = "Mining payout / exchange ledger reconciler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Value unprocessed payouts against exchange orders and record the result
    Reconcile {
        /// Payment pool (overrides reconcile.pool from config)
        #[arg(long)]
        pool: Option<String>,

        /// Trading pair, e.g. ETH-USD (overrides reconcile.product from config)
        #[arg(long)]
        product: Option<String>,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Compute and print only; nothing is written or marked
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity + schema presence, optionally with a pool's backlog
    Status {
        #[arg(long)]
        pool: Option<String>,
    },

    /// Apply SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Reconcile {
            pool,
            product,
            config_paths,
            dry_run,
            json,
        } => {
            commands::reconcile::run(commands::reconcile::ReconcileArgs {
                pool,
                product,
                config_paths,
                dry_run,
                json,
            })
            .await?;
        }

        Commands::Db { cmd } => {
            let pool = mxr_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status { pool: pool_name } => {
                    let s = mxr_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_payments_table={} has_exchange_transactions_table={}",
                        s.ok, s.has_payments_table, s.has_exchange_transactions_table
                    );
                    if let Some(name) = pool_name {
                        if s.has_payments_table {
                            let n = mxr_db::count_unprocessed_payments(&pool, &name).await?;
                            println!("pool={} unprocessed_payments={}", name, n);
                        }
                    }
                }
                DbCmd::Migrate => {
                    mxr_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable (`--json`, key=value lines).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
