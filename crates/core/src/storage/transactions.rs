use crate::domain::transaction::{StoreMetadata, TransactionRecord};
use anyhow::Context;

const SELECT_RECORDS: &str = "SELECT store_id, peer_cluster, category, description, period, \
     units_sold, revenue, unit_price, flag_name, city, state \
     FROM store_sales_monthly";

/// One row per store; the highest cluster on record wins, matching `fetch_store`.
const SELECT_DIRECTORY: &str = "SELECT DISTINCT ON (store_id) \
     store_id, flag_name, city, state, peer_cluster \
     FROM store_sales_monthly";
const DIRECTORY_ORDER: &str = "ORDER BY store_id, peer_cluster DESC";

pub async fn fetch_by_period(
    pool: &sqlx::PgPool,
    period: &str,
) -> anyhow::Result<Vec<TransactionRecord>> {
    let t0 = std::time::Instant::now();
    let rows = sqlx::query_as::<_, TransactionRecord>(&format!("{SELECT_RECORDS} WHERE period = $1"))
        .persistent(false)
        .bind(period)
        .fetch_all(pool)
        .await
        .with_context(|| format!("select store_sales_monthly for period={period} failed"))?;

    tracing::debug!(
        period,
        rows = rows.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "fetched sales by period"
    );
    Ok(rows)
}

pub async fn fetch_by_description(
    pool: &sqlx::PgPool,
    description: &str,
) -> anyhow::Result<Vec<TransactionRecord>> {
    let rows =
        sqlx::query_as::<_, TransactionRecord>(&format!("{SELECT_RECORDS} WHERE description = $1"))
            .persistent(false)
            .bind(description)
            .fetch_all(pool)
            .await
            .context("select store_sales_monthly by description failed")?;

    tracing::debug!(description, rows = rows.len(), "fetched sales by description");
    Ok(rows)
}

/// Most recent period first.
pub async fn distinct_periods(pool: &sqlx::PgPool) -> anyhow::Result<Vec<String>> {
    sqlx::query_scalar("SELECT DISTINCT period FROM store_sales_monthly ORDER BY period DESC")
        .fetch_all(pool)
        .await
        .context("select distinct period failed")
}

pub async fn distinct_categories(pool: &sqlx::PgPool) -> anyhow::Result<Vec<String>> {
    sqlx::query_scalar("SELECT DISTINCT category FROM store_sales_monthly ORDER BY category")
        .fetch_all(pool)
        .await
        .context("select distinct category failed")
}

/// Products on record, optionally limited to one category.
pub async fn distinct_products(
    pool: &sqlx::PgPool,
    category: Option<&str>,
) -> anyhow::Result<Vec<(String, String)>> {
    let rows = match category {
        Some(category) => {
            sqlx::query_as::<_, (String, String)>(
                "SELECT DISTINCT category, description FROM store_sales_monthly \
                 WHERE category = $1 \
                 ORDER BY category, description",
            )
            .persistent(false)
            .bind(category)
            .fetch_all(pool)
            .await
            .with_context(|| format!("select products for category={category} failed"))?
        }
        None => {
            sqlx::query_as::<_, (String, String)>(
                "SELECT DISTINCT category, description FROM store_sales_monthly \
                 ORDER BY category, description",
            )
            .persistent(false)
            .fetch_all(pool)
            .await
            .context("select products failed")?
        }
    };
    Ok(rows)
}

pub async fn store_directory(
    pool: &sqlx::PgPool,
    city: Option<&str>,
) -> anyhow::Result<Vec<StoreMetadata>> {
    let rows = match city {
        Some(city) => {
            sqlx::query_as::<_, StoreMetadata>(&format!(
                "{SELECT_DIRECTORY} WHERE city = $1 {DIRECTORY_ORDER}"
            ))
            .persistent(false)
            .bind(city)
            .fetch_all(pool)
            .await
            .with_context(|| format!("select store directory for city={city} failed"))?
        }
        None => {
            sqlx::query_as::<_, StoreMetadata>(&format!("{SELECT_DIRECTORY} {DIRECTORY_ORDER}"))
                .persistent(false)
                .fetch_all(pool)
                .await
                .context("select store directory failed")?
        }
    };
    Ok(rows)
}

/// Directory entry for one store across all periods.
pub async fn fetch_store(
    pool: &sqlx::PgPool,
    store_id: &str,
) -> anyhow::Result<Option<StoreMetadata>> {
    sqlx::query_as::<_, StoreMetadata>(
        "SELECT store_id, flag_name, city, state, peer_cluster \
         FROM store_sales_monthly \
         WHERE store_id = $1 \
         ORDER BY peer_cluster DESC \
         LIMIT 1",
    )
    .persistent(false)
    .bind(store_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select store {store_id} failed"))
}
