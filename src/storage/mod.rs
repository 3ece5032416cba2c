use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

mod schema;

const PAYOUT_COLUMNS: &str = "id, pid, user, address, amount, currency_code, txid, associated, \
                              locked, lock_time, paid_time, assoc_time, pull_time";

/// One payout pulled from SC, tracked until it is paid and associated.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payout {
    pub id: i64,
    pub pid: String,
    pub user: String,
    pub address: String,
    /// Decimal amount kept as text; sqlite has no decimal type.
    pub amount: String,
    pub currency_code: String,
    pub txid: Option<String>,
    pub associated: bool,
    pub locked: bool,
    pub lock_time: Option<DateTime<Utc>>,
    pub paid_time: Option<DateTime<Utc>>,
    pub assoc_time: Option<DateTime<Utc>>,
    pub pull_time: Option<DateTime<Utc>>,
}

impl Payout {
    pub fn amount(&self) -> Result<Decimal> {
        Decimal::from_str(&self.amount)
            .map_err(|e| anyhow::anyhow!("Payout {} has bad amount {:?}: {}", self.pid, self.amount, e))
    }

    pub fn trans_id(&self) -> &str {
        self.txid.as_deref().unwrap_or("NULL")
    }
}

#[derive(Debug, Clone)]
pub struct NewPayout {
    pub pid: String,
    pub user: String,
    pub address: String,
    pub amount: Decimal,
}

/// Payout state for a single currency.
///
/// The pool holds exactly one connection so every caller is serialized
/// against the same database handle, which also keeps `sqlite::memory:`
/// databases alive for the lifetime of the storage.
#[derive(Debug, Clone)]
pub struct PayoutStorage {
    pool: SqlitePool,
    currency_code: String,
}

impl PayoutStorage {
    pub async fn open(path: &Path, currency_code: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("Failed to create database dir {:?}: {}", parent, e);
                }
            }
        }
        Self::new_with_url(&format!("sqlite://{}", path.display()), currency_code).await
    }

    pub async fn new_with_url(database_url: &str, currency_code: &str) -> Result<Self> {
        let mut db_url = database_url.to_string();
        if db_url.starts_with("sqlite:") && !db_url.starts_with("sqlite://") {
            db_url = db_url.replacen("sqlite:", "sqlite://", 1);
        }
        let is_memory = db_url.contains(":memory:");
        debug!(currency = %currency_code, memory = is_memory, "[storage] opening payout database");

        let mut connect_options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| anyhow::anyhow!("Invalid database URL: {}", e))?
            .create_if_missing(true);
        if !is_memory {
            connect_options = connect_options
                .journal_mode(SqliteJournalMode::Wal)
                .locking_mode(sqlx::sqlite::SqliteLockingMode::Exclusive);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

        schema::init_schema(&pool).await?;

        info!(currency = %currency_code, "Payout storage initialized");
        Ok(Self { pool, currency_code: currency_code.to_string() })
    }

    pub fn currency_code(&self) -> &str {
        &self.currency_code
    }

    /// Drop every payout and recreate the table.
    pub async fn init_db(&self) -> Result<()> {
        warn!(currency = %self.currency_code, "Dropping and recreating payouts table");
        schema::drop_schema(&self.pool).await?;
        schema::init_schema(&self.pool).await
    }

    pub async fn payout_exists(&self, pid: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM payouts WHERE pid = ?1")
            .bind(pid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to look up payout {}: {}", pid, e))?;
        Ok(row.is_some())
    }

    /// Insert a freshly pulled payout. Returns `false` if the pid is already stored.
    pub async fn insert_payout(&self, payout: &NewPayout, pull_time: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO payouts (pid, user, address, amount, currency_code, pull_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&payout.pid)
        .bind(&payout.user)
        .bind(&payout.address)
        .bind(payout.amount.to_string())
        .bind(&self.currency_code)
        .bind(pull_time)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to store payout {}: {}", payout.pid, e))?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_payout(&self, id: i64) -> Result<Option<Payout>> {
        let sql = format!("SELECT {} FROM payouts WHERE id = ?1", PAYOUT_COLUMNS);
        sqlx::query_as::<_, Payout>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load payout {}: {}", id, e))
    }

    async fn select(&self, filter: &str) -> Result<Vec<Payout>> {
        let sql = format!(
            "SELECT {} FROM payouts WHERE currency_code = ?1 AND {} ORDER BY id",
            PAYOUT_COLUMNS, filter
        );
        sqlx::query_as::<_, Payout>(&sql)
            .bind(&self.currency_code)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list payouts: {}", e))
    }

    /// Payouts waiting to be sent.
    pub async fn unpaid_unlocked(&self) -> Result<Vec<Payout>> {
        self.select("txid IS NULL AND locked = 0").await
    }

    /// Payouts caught mid-send; these need an operator.
    pub async fn unpaid_locked(&self) -> Result<Vec<Payout>> {
        self.select("txid IS NULL AND locked = 1").await
    }

    pub async fn paid_unassociated(&self) -> Result<Vec<Payout>> {
        self.select("txid IS NOT NULL AND associated = 0").await
    }

    pub async fn completed(&self) -> Result<Vec<Payout>> {
        self.select("txid IS NOT NULL AND associated = 1").await
    }

    /// Lock unpaid, unlocked payouts in one transaction.
    ///
    /// Fails and changes nothing if any id is already locked or paid.
    pub async fn lock_payouts(&self, ids: &[i64]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for id in ids {
            let result = sqlx::query(
                "UPDATE payouts SET locked = 1, lock_time = ?1 \
                 WHERE id = ?2 AND locked = 0 AND txid IS NULL",
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to lock payout {}: {}", id, e))?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(anyhow::anyhow!("Payout {} is already locked or paid", id));
            }
        }
        tx.commit().await?;
        debug!(currency = %self.currency_code, count = ids.len(), "Locked payouts");
        Ok(())
    }

    pub async fn unlock_payouts(&self, ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE payouts SET locked = 0, lock_time = NULL WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to unlock payout {}: {}", id, e))?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Record `txid` on the given payouts and release their locks.
    pub async fn mark_paid(&self, ids: &[i64], txid: &str) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(
                "UPDATE payouts SET txid = ?1, paid_time = ?2, locked = 0 WHERE id = ?3",
            )
            .bind(txid)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to mark payout {} paid: {}", id, e))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn mark_associated(&self, ids: &[i64]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE payouts SET associated = 1, assoc_time = ?1 WHERE id = ?2")
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to mark payout {} associated: {}", id, e))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn count_locked(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payouts WHERE currency_code = ?1 AND locked = 1")
                .bind(&self.currency_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn reset_all_locked(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE payouts SET locked = 0, lock_time = NULL WHERE currency_code = ?1 AND locked = 1",
        )
        .bind(&self.currency_code)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to reset locked payouts: {}", e))?;
        Ok(result.rows_affected())
    }

    /// Attach `txid` to one unpaid, locked payout. Returns `false` if `id`
    /// does not name such a payout.
    pub async fn local_associate_locked(&self, id: i64, txid: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payouts SET txid = ?1, paid_time = ?2, locked = 0 \
             WHERE id = ?3 AND txid IS NULL AND locked = 1",
        )
        .bind(txid)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to associate payout {}: {}", id, e))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn local_associate_all_locked(&self, txid: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE payouts SET txid = ?1, paid_time = ?2, locked = 0 \
             WHERE currency_code = ?3 AND txid IS NULL AND locked = 1",
        )
        .bind(txid)
        .bind(Utc::now())
        .bind(&self.currency_code)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to associate locked payouts: {}", e))?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
