use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("malformed row {row}: field `{field}` {reason}")]
    MalformedRow {
        row: usize,
        field: &'static str,
        reason: String,
    },

    #[error("store {0:?} has no rows in the dataset")]
    UnknownStore(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AnalyticsError {
    pub(crate) fn malformed(row: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            row,
            field,
            reason: reason.into(),
        }
    }
}
