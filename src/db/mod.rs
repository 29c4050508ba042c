//! Policy persistence.
//!
//! The copy policy lives in a single-row SQLite table so it survives
//! restarts. [`InMemoryPolicyStore`] is the non-persistent alternative.

mod memory;

pub use memory::InMemoryPolicyStore;

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::debug;

use crate::error::StoreError;
use crate::models::CopyPolicy;
use crate::traits::PolicyStore;

/// SQLite-backed policy store.
pub struct Database {
    pool: SqlitePool,
}

/// Stored policy row. Decimals are kept as text to avoid float rounding.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredPolicy {
    source_address: String,
    label: Option<String>,
    copy_ratio: String,
    fixed_amount: Option<String>,
    is_active: bool,
}

impl TryFrom<StoredPolicy> for CopyPolicy {
    type Error = StoreError;

    fn try_from(row: StoredPolicy) -> Result<Self, Self::Error> {
        let parse = |field: &str, value: &str| {
            Decimal::from_str(value)
                .map_err(|e| StoreError::Corrupt(format!("{} = {:?}: {}", field, value, e)))
        };

        let policy = CopyPolicy {
            copy_ratio: parse("copy_ratio", &row.copy_ratio)?,
            fixed_amount: row
                .fixed_amount
                .as_deref()
                .map(|v| parse("fixed_amount", v))
                .transpose()?,
            source_address: row.source_address,
            label: row.label,
            is_active: row.is_active,
        };
        policy
            .validate()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(policy)
    }
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database gets its own database
        let in_memory = database_url.contains(":memory:");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_policy (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                source_address TEXT NOT NULL,
                label TEXT,
                copy_ratio TEXT NOT NULL DEFAULT '1',
                fixed_amount TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create copy_policy table")?;

        Ok(())
    }
}

#[async_trait]
impl PolicyStore for Database {
    async fn get(&self) -> Result<Option<CopyPolicy>, StoreError> {
        let row = sqlx::query_as::<_, StoredPolicy>(
            r#"
            SELECT source_address, label, copy_ratio, fixed_amount, is_active
            FROM copy_policy
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(CopyPolicy::try_from).transpose()
    }

    async fn replace(&self, policy: CopyPolicy) -> Result<CopyPolicy, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO copy_policy (id, source_address, label, copy_ratio, fixed_amount, is_active, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                source_address = excluded.source_address,
                label = excluded.label,
                copy_ratio = excluded.copy_ratio,
                fixed_amount = excluded.fixed_amount,
                is_active = excluded.is_active,
                updated_at = datetime('now')
            "#,
        )
        .bind(&policy.source_address)
        .bind(&policy.label)
        .bind(policy.copy_ratio.to_string())
        .bind(policy.fixed_amount.map(|a| a.to_string()))
        .bind(policy.is_active)
        .execute(&self.pool)
        .await?;

        debug!(source = %policy.source_address, "Copy policy saved");
        Ok(policy)
    }

    async fn clear(&self) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM copy_policy WHERE id = 1")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
