use crate::analytics::error::AnalyticsError;
use serde::{Deserialize, Serialize};

/// One store/product/month sales row as delivered by the data-access layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRecord {
    pub store_id: String,
    pub peer_cluster: i64,
    pub category: String,
    pub description: String,
    pub period: String,
    pub units_sold: f64,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub flag_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
}

impl TransactionRecord {
    /// Rows with zero units are non-sales and never ranked.
    pub fn is_sale(&self) -> bool {
        self.units_sold > 0.0
    }

    /// Reported revenue, or `unit_price * units_sold` when only a price is known.
    pub fn revenue(&self) -> Option<f64> {
        self.revenue
            .or_else(|| self.unit_price.map(|p| p * self.units_sold))
    }

    /// Reported unit price, or revenue per unit rounded to cents.
    pub fn unit_price(&self) -> Option<f64> {
        if let Some(p) = self.unit_price {
            return Some(p);
        }
        let revenue = self.revenue?;
        if self.units_sold > 0.0 {
            Some(round_to(revenue / self.units_sold, 2))
        } else {
            None
        }
    }

    pub fn metadata(&self) -> StoreMetadata {
        StoreMetadata {
            store_id: self.store_id.clone(),
            flag_name: self.flag_name.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            peer_cluster: self.peer_cluster,
        }
    }
}

/// Descriptive store attributes; never used in any computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoreMetadata {
    pub store_id: String,
    pub flag_name: String,
    pub city: String,
    pub state: String,
    pub peer_cluster: i64,
}

/// Store details from the store's first row, with the highest cluster on record.
/// Clusters are constant per store; the max only guards against inconsistent input.
pub fn store_metadata(rows: &[TransactionRecord], store_id: &str) -> Option<StoreMetadata> {
    let mut store_rows = rows.iter().filter(|r| r.store_id == store_id);
    let mut store = store_rows.next()?.metadata();
    for row in store_rows {
        store.peer_cluster = store.peer_cluster.max(row.peer_cluster);
    }
    Some(store)
}

/// Rejects rows that break the input contract instead of coercing them.
pub fn validate_records(rows: &[TransactionRecord]) -> Result<(), AnalyticsError> {
    for (idx, row) in rows.iter().enumerate() {
        validate_record(idx, row)?;
    }
    Ok(())
}

fn validate_record(row_idx: usize, row: &TransactionRecord) -> Result<(), AnalyticsError> {
    let required = [
        ("store_id", &row.store_id),
        ("category", &row.category),
        ("description", &row.description),
        ("period", &row.period),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AnalyticsError::malformed(row_idx, field, "must be non-empty"));
        }
    }

    if !row.units_sold.is_finite() {
        return Err(AnalyticsError::malformed(row_idx, "units_sold", "must be a finite number"));
    }
    if row.units_sold < 0.0 {
        return Err(AnalyticsError::malformed(
            row_idx,
            "units_sold",
            format!("must be >= 0 (got {})", row.units_sold),
        ));
    }

    for (field, value) in [("revenue", row.revenue), ("unit_price", row.unit_price)] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(AnalyticsError::malformed(
                    row_idx,
                    field,
                    format!("must be a finite non-negative number (got {v})"),
                ));
            }
        }
    }

    Ok(())
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}


#[cfg(test)]
mod tests {
    use super::fixtures::row;
    use super::*;

    #[test]
    fn revenue_is_derived_from_unit_price() {
        let mut r = row("S1", 1, "Cola 12pk", 4.0);
        r.unit_price = Some(2.5);
        assert_eq!(r.revenue(), Some(10.0));

        r.revenue = Some(9.0);
        assert_eq!(r.revenue(), Some(9.0));
    }

    #[test]
    fn unit_price_is_derived_from_revenue_and_rounded() {
        let mut r = row("S1", 1, "Cola 12pk", 3.0);
        r.revenue = Some(10.0);
        assert_eq!(r.unit_price(), Some(3.33));

        r.units_sold = 0.0;
        assert_eq!(r.unit_price(), None);
    }

    #[test]
    fn rejects_negative_units() {
        let rows = vec![row("S1", 1, "A", 1.0), row("S1", 1, "B", -2.0)];
        let err = validate_records(&rows).unwrap_err();
        match err {
            AnalyticsError::MalformedRow { row, field, .. } => {
                assert_eq!(row, 1);
                assert_eq!(field, "units_sold");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_blank_required_fields_and_nan_prices() {
        let mut blank = row("S1", 1, "A", 1.0);
        blank.category = "  ".to_string();
        assert!(validate_records(&[blank]).is_err());

        let mut nan = row("S1", 1, "A", 1.0);
        nan.unit_price = Some(f64::NAN);
        assert!(validate_records(&[nan]).is_err());
    }

    #[test]
    fn accepts_zero_unit_rows() {
        assert!(validate_records(&[row("S1", 1, "A", 0.0)]).is_ok());
    }
}
