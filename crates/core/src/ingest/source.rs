use crate::domain::transaction::{StoreMetadata, TransactionRecord};
use crate::storage::transactions;
use anyhow::Result;

/// Where the engine's in-memory snapshot comes from. All blocking I/O happens
/// here, before any analytics run.
#[async_trait::async_trait]
pub trait TransactionSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Every row for one period (all stores, categories, products).
    async fn rows_for_period(&self, period: &str) -> Result<Vec<TransactionRecord>>;

    /// Every row for one product description.
    async fn rows_for_description(&self, description: &str) -> Result<Vec<TransactionRecord>>;

    /// Directory details for a store regardless of period; `None` if never seen.
    async fn store(&self, store_id: &str) -> Result<Option<StoreMetadata>>;
}

#[derive(Debug, Clone)]
pub struct PgTransactionSource {
    pool: sqlx::PgPool,
}

impl PgTransactionSource {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TransactionSource for PgTransactionSource {
    fn source_name(&self) -> &'static str {
        "postgres"
    }

    async fn rows_for_period(&self, period: &str) -> Result<Vec<TransactionRecord>> {
        transactions::fetch_by_period(&self.pool, period).await
    }

    async fn rows_for_description(&self, description: &str) -> Result<Vec<TransactionRecord>> {
        transactions::fetch_by_description(&self.pool, description).await
    }

    async fn store(&self, store_id: &str) -> Result<Option<StoreMetadata>> {
        transactions::fetch_store(&self.pool, store_id).await
    }
}

/// Rows for `period`, plus the store's directory entry when the store sold
/// nothing that month and so has no row of its own.
pub async fn period_rows_for_store(
    source: &dyn TransactionSource,
    period: &str,
    store_id: &str,
) -> Result<(Vec<TransactionRecord>, Option<StoreMetadata>)> {
    let rows = source.rows_for_period(period).await?;
    if rows.iter().any(|r| r.store_id == store_id) {
        return Ok((rows, None));
    }

    let directory = source.store(store_id).await?;
    tracing::debug!(
        store_id,
        period,
        found = directory.is_some(),
        "store has no rows in period; used directory"
    );
    Ok((rows, directory))
}
