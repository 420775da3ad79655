/// Migrating twice must be idempotent.
///
/// DB-backed test, skipped if MXR_DATABASE_URL is not set.
#[tokio::test]
async fn migrate_idempotent_on_clean_db() -> anyhow::Result<()> {
    let url = match std::env::var(mxr_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: MXR_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;

    mxr_db::migrate(&pool).await?;
    mxr_db::migrate(&pool).await?;

    let st = mxr_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_payments_table);
    assert!(st.has_exchange_transactions_table);

    Ok(())
}
