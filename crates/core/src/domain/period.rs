use anyhow::Context;
use chrono::NaiveDate;

/// Parses a `YYYY-MM` period and returns it normalized (zero-padded month).
pub fn parse_period(s: &str) -> anyhow::Result<String> {
    let s = s.trim();
    let first_day = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .with_context(|| format!("period must be YYYY-MM (got {s:?})"))?;
    Ok(first_day.format("%Y-%m").to_string())
}
