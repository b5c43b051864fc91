use crate::domain::transaction::{store_metadata, StoreMetadata, TransactionRecord};
use crate::ingest::source::TransactionSource;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Reads a JSON array of records from disk on every call.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<TransactionRecord>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let rows = parse_records(&text)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), rows = rows.len(), "loaded sales file");
        Ok(rows)
    }
}

pub fn parse_records(text: &str) -> Result<Vec<TransactionRecord>> {
    serde_json::from_str::<Vec<TransactionRecord>>(text)
        .context("input is not a JSON array of sales records")
}

#[async_trait::async_trait]
impl TransactionSource for JsonFileSource {
    fn source_name(&self) -> &'static str {
        "json-file"
    }

    async fn rows_for_period(&self, period: &str) -> Result<Vec<TransactionRecord>> {
        let mut rows = self.load().await?;
        rows.retain(|r| r.period == period);
        Ok(rows)
    }

    async fn rows_for_description(&self, description: &str) -> Result<Vec<TransactionRecord>> {
        let mut rows = self.load().await?;
        rows.retain(|r| r.description == description);
        Ok(rows)
    }

    async fn store(&self, store_id: &str) -> Result<Option<StoreMetadata>> {
        let rows = self.load().await?;
        Ok(store_metadata(&rows, store_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_records_with_optional_columns() {
        let text = json!([
            {
                "store_id": "SPICC",
                "peer_cluster": 2,
                "category": "Beverage: Soda",
                "description": "Cola 12pk",
                "period": "2019-09",
                "units_sold": 12.0,
                "revenue": 23.88,
                "flag_name": "Hampton",
                "city": "Austin",
                "state": "TX"
            },
            {
                "store_id": "SPICC",
                "peer_cluster": 2,
                "category": "Beverage: Soda",
                "description": "Lemon Soda",
                "period": "2019-09",
                "units_sold": 3.0
            }
        ])
        .to_string();

        let rows = parse_records(&text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].unit_price(), Some(1.99));
        assert_eq!(rows[1].revenue, None);
        assert_eq!(rows[1].flag_name, "");
    }

    #[test]
    fn store_lookup_spans_all_periods() {
        let text = json!([
            {
                "store_id": "S9",
                "peer_cluster": 1,
                "category": "Snacks",
                "description": "Chips",
                "period": "2019-07",
                "units_sold": 2.0,
                "flag_name": "Hampton",
                "city": "Austin",
                "state": "TX"
            },
            {
                "store_id": "S9",
                "peer_cluster": 4,
                "category": "Snacks",
                "description": "Chips",
                "period": "2019-08",
                "units_sold": 1.0
            }
        ])
        .to_string();
        let rows = parse_records(&text).unwrap();

        let store = store_metadata(&rows, "S9").unwrap();
        assert_eq!(store.peer_cluster, 4);
        assert_eq!(store.city, "Austin");
        assert!(store_metadata(&rows, "S1").is_none());
    }

    #[test]
    fn rejects_non_array_input() {
        assert!(parse_records("{\"store_id\": \"S1\"}").is_err());
        assert!(parse_records("[{\"store_id\": \"S1\"}]").is_err());
    }
}
