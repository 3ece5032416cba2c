use anyhow::Result;
use sqlx::SqlitePool;

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pid TEXT UNIQUE NOT NULL,
            user TEXT NOT NULL,
            address TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency_code TEXT NOT NULL,
            txid TEXT,
            associated BOOLEAN NOT NULL DEFAULT 0,
            locked BOOLEAN NOT NULL DEFAULT 0,
            lock_time DATETIME,
            paid_time DATETIME,
            assoc_time DATETIME,
            pull_time DATETIME
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create payouts table: {}", e))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_payouts_txid ON payouts (txid)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn drop_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DROP TABLE IF EXISTS payouts")
        .execute(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to drop payouts table: {}", e))?;
    Ok(())
}
