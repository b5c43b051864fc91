use crate::analytics::aggregate::{
    aggregate, total_units, RankedProductRow, ScopeFilter, Selection,
};
use crate::analytics::error::AnalyticsError;
use crate::domain::transaction::{
    round_to, store_metadata, validate_records, StoreMetadata, TransactionRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Store rows past this cumulative share form the long tail eligible for removal.
pub const LONG_TAIL_CUMULATIVE_SHARE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Header,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonLine {
    pub kind: LineKind,
    pub text: String,
}

impl ComparisonLine {
    fn header(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Header,
            text: text.into(),
        }
    }

    fn detail(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Detail,
            text: text.into(),
        }
    }

    pub fn is_header(&self) -> bool {
        self.kind == LineKind::Header
    }
}

/// Products to add (in cluster rank order) and long-tail products to drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockingSuggestion {
    pub missing: Vec<String>,
    pub to_remove: Vec<RankedProductRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub store: StoreMetadata,
    pub category: String,
    pub period: String,
    pub lines: Vec<ComparisonLine>,
    /// `None` when the store sold nothing in the category/period.
    pub suggestion: Option<StockingSuggestion>,
}

#[derive(Debug, Clone, Copy)]
pub struct ComparisonRequest<'a> {
    pub store_id: &'a str,
    pub category: &'a str,
    pub period: &'a str,
    pub top_n: usize,
}

/// Ranks one store against its peer cluster and the whole network and derives
/// stocking suggestions.
pub fn compare(
    req: &ComparisonRequest<'_>,
    rows: &[TransactionRecord],
) -> Result<ComparisonResult, AnalyticsError> {
    compare_with_directory(req, rows, None)
}

/// Like [`compare`], but `directory` supplies the store's cluster and details
/// when `rows` hold nothing for it (e.g. a store with no sales that period).
pub fn compare_with_directory(
    req: &ComparisonRequest<'_>,
    rows: &[TransactionRecord],
    directory: Option<&StoreMetadata>,
) -> Result<ComparisonResult, AnalyticsError> {
    if req.top_n == 0 {
        return Err(AnalyticsError::InvalidArgument(
            "top_n must be at least 1".to_string(),
        ));
    }
    validate_records(rows)?;

    let store = store_metadata(rows, req.store_id)
        .or_else(|| directory.filter(|d| d.store_id == req.store_id).cloned())
        .ok_or_else(|| AnalyticsError::UnknownStore(req.store_id.to_string()))?;
    let cluster = store.peer_cluster;

    let store_prods = aggregate(
        rows,
        &Selection {
            scope: ScopeFilter::Store(req.store_id),
            category: req.category,
            period: req.period,
        },
    );
    let cluster_prods = top(
        aggregate(
            rows,
            &Selection {
                scope: ScopeFilter::Cluster(cluster),
                category: req.category,
                period: req.period,
            },
        ),
        req.top_n,
    );
    let network_prods = top(
        aggregate(
            rows,
            &Selection {
                scope: ScopeFilter::Network,
                category: req.category,
                period: req.period,
            },
        ),
        req.top_n,
    );

    let mut lines = vec![ComparisonLine::header(format!(
        "For store #{}, {}, {}, {}, for {}, part of Cluster ({})",
        store.store_id, store.flag_name, store.city, store.state, req.period, cluster
    ))];

    if store_prods.is_empty() {
        tracing::info!(
            store_id = req.store_id,
            category = req.category,
            period = req.period,
            "store has no sales in category; listing peer and network leaders only"
        );
        lines.push(ComparisonLine::header(format!(
            "No products sold in {}",
            req.category
        )));
        let national = format!("National top products in {}:", req.category);
        push_peer_lists(&mut lines, &national, cluster, &cluster_prods, &network_prods);
        return Ok(ComparisonResult {
            store,
            category: req.category.to_string(),
            period: req.period.to_string(),
            lines,
            suggestion: None,
        });
    }

    lines.push(ComparisonLine::header(format!(
        "Your top products in {}:",
        req.category
    )));
    for (i, row) in store_prods.iter().take(req.top_n).enumerate() {
        lines.push(ComparisonLine::detail(units_line(i, row)));
    }
    push_peer_lists(
        &mut lines,
        "National top product:",
        cluster,
        &cluster_prods,
        &network_prods,
    );

    let suggestion = stocking_suggestion(&store_prods, &cluster_prods);
    tracing::debug!(
        store_id = req.store_id,
        missing = suggestion.missing.len(),
        to_remove = suggestion.to_remove.len(),
        "stocking suggestion computed"
    );

    if suggestion.missing.is_empty() {
        lines.push(ComparisonLine::header("You are selling the top products already!"));
    } else {
        lines.push(ComparisonLine::header("Stocking suggestions:"));
        for (i, item) in suggestion.missing.iter().enumerate() {
            lines.push(ComparisonLine::detail(format!("{}. {}", i + 1, item)));
        }
    }
    if !suggestion.to_remove.is_empty() {
        lines.push(ComparisonLine::header("Consider discontinue stocking:"));
        for (i, row) in suggestion.to_remove.iter().enumerate() {
            lines.push(ComparisonLine::detail(units_line(i, row)));
        }
    }

    Ok(ComparisonResult {
        store,
        category: req.category.to_string(),
        period: req.period.to_string(),
        lines,
        suggestion: Some(suggestion),
    })
}

/// `missing`: cluster leaders the store never sold, kept in cluster rank order.
/// `to_remove`: store long tail that is not among the cluster leaders.
pub fn stocking_suggestion(
    store_prods: &[RankedProductRow],
    cluster_top: &[RankedProductRow],
) -> StockingSuggestion {
    let sold: BTreeSet<&str> = store_prods.iter().map(|r| r.description()).collect();
    let leaders: BTreeSet<&str> = cluster_top.iter().map(|r| r.description()).collect();

    let missing = cluster_top
        .iter()
        .map(|r| r.description())
        .filter(|d| !sold.contains(d))
        .map(str::to_string)
        .collect();

    let to_remove = store_prods
        .iter()
        .filter(|r| !leaders.contains(r.description()))
        .filter(|r| r.cumulative_share.unwrap_or(0.0) > LONG_TAIL_CUMULATIVE_SHARE)
        .cloned()
        .collect();

    StockingSuggestion { missing, to_remove }
}

fn push_peer_lists(
    lines: &mut Vec<ComparisonLine>,
    national_header: &str,
    cluster: i64,
    cluster_prods: &[RankedProductRow],
    network_prods: &[RankedProductRow],
) {
    lines.push(ComparisonLine::header(format!(
        "Cluster ({cluster}) top products:"
    )));
    push_share_lines(lines, cluster_prods);
    lines.push(ComparisonLine::header(national_header));
    push_share_lines(lines, network_prods);
}

/// Shares are relative to the listed rows, not the full view.
fn push_share_lines(lines: &mut Vec<ComparisonLine>, rows: &[RankedProductRow]) {
    let total = total_units(rows);
    for (i, row) in rows.iter().enumerate() {
        lines.push(ComparisonLine::detail(format!(
            "{}. {}: {}%",
            i + 1,
            row.description(),
            percent(row.units_sold / total)
        )));
    }
}

fn units_line(i: usize, row: &RankedProductRow) -> String {
    format!(
        "{}. {}: {} units, {}%",
        i + 1,
        row.description(),
        row.units_sold,
        percent(row.share_of_sold.unwrap_or(0.0))
    )
}

fn percent(fraction: f64) -> String {
    format!("{:.1}", round_to(100.0 * fraction, 1))
}

fn top(mut rows: Vec<RankedProductRow>, n: usize) -> Vec<RankedProductRow> {
    rows.truncate(n);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::fixtures::row;

    fn request(store_id: &str) -> ComparisonRequest<'_> {
        ComparisonRequest {
            store_id,
            category: "Beverage: Soda",
            period: "2019-09",
            top_n: 5,
        }
    }

    fn dataset() -> Vec<TransactionRecord> {
        vec![
            row("S1", 3, "A", 50.0),
            row("S1", 3, "B", 30.0),
            row("S2", 3, "A", 100.0),
            row("S2", 3, "B", 90.0),
            row("S2", 3, "C", 80.0),
            row("S2", 3, "D", 70.0),
            row("S2", 3, "E", 60.0),
            row("S3", 7, "A", 500.0),
            row("S3", 7, "C", 400.0),
            row("S3", 7, "F", 300.0),
            row("S3", 7, "G", 250.0),
            row("S3", 7, "H", 200.0),
        ]
    }

    #[test]
    fn suggests_cluster_leaders_the_store_lacks() {
        let rows = dataset();
        let result = compare(&request("S1"), &rows).unwrap();
        let suggestion = result.suggestion.unwrap();
        assert_eq!(suggestion.missing, vec!["C", "D", "E"]);
        assert!(suggestion.to_remove.is_empty());

        assert_eq!(
            result.lines[0].text,
            "For store #S1, Flag S1, Denver, CO, for 2019-09, part of Cluster (3)"
        );
        assert!(result
            .lines
            .iter()
            .any(|l| l.is_header() && l.text == "Stocking suggestions:"));
        assert!(result
            .lines
            .iter()
            .any(|l| l.text == "1. A: 50 units, 62.5%"));
        assert!(result
            .lines
            .iter()
            .any(|l| l.is_header() && l.text == "National top product:"));
    }

    #[test]
    fn store_absent_from_period_uses_directory_entry() {
        let rows: Vec<TransactionRecord> = dataset()
            .into_iter()
            .filter(|r| r.store_id != "S1")
            .collect();
        assert!(matches!(
            compare(&request("S1"), &rows),
            Err(AnalyticsError::UnknownStore(_))
        ));

        let directory = StoreMetadata {
            store_id: "S1".to_string(),
            flag_name: "Flag S1".to_string(),
            city: "Denver".to_string(),
            state: "CO".to_string(),
            peer_cluster: 3,
        };
        let result = compare_with_directory(&request("S1"), &rows, Some(&directory)).unwrap();

        assert!(result.suggestion.is_none());
        let texts: Vec<&str> = result.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts[0],
            "For store #S1, Flag S1, Denver, CO, for 2019-09, part of Cluster (3)"
        );
        assert_eq!(texts[1], "No products sold in Beverage: Soda");
        assert!(texts.contains(&"Cluster (3) top products:"));
        assert!(texts.contains(&"National top products in Beverage: Soda:"));
    }

    #[test]
    fn directory_entry_for_another_store_is_ignored() {
        let rows = dataset();
        let other = StoreMetadata {
            store_id: "S2".to_string(),
            flag_name: String::new(),
            city: String::new(),
            state: String::new(),
            peer_cluster: 3,
        };
        assert!(matches!(
            compare_with_directory(&request("S9"), &rows, Some(&other)),
            Err(AnalyticsError::UnknownStore(_))
        ));
    }

    #[test]
    fn store_without_sales_gets_peer_lists_only() {
        let mut rows = dataset();
        rows.push(row("S9", 3, "A", 0.0));
        let result = compare(&request("S9"), &rows).unwrap();

        assert!(result.suggestion.is_none());
        let texts: Vec<&str> = result.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts[1], "No products sold in Beverage: Soda");
        assert!(texts.contains(&"Cluster (3) top products:"));
        assert!(texts.contains(&"National top products in Beverage: Soda:"));
        assert!(!texts.contains(&"Stocking suggestions:"));
        // Network A = 650 of the listed top-5 total 1880.
        assert!(texts.contains(&"1. A: 34.6%"));
    }

    #[test]
    fn flags_long_tail_outside_cluster_leaders() {
        let mut rows = dataset();
        rows.push(row("S2", 3, "Z", 1.0));
        let mut req = request("S2");
        req.top_n = 3;
        let result = compare(&req, &rows).unwrap();
        let suggestion = result.suggestion.unwrap();

        assert!(suggestion.missing.is_empty());
        let removed: Vec<&str> = suggestion.to_remove.iter().map(|r| r.description()).collect();
        // E sits past the 90% cumulative mark, Z is last; neither is a top-3 leader.
        assert_eq!(removed, vec!["E", "Z"]);
        assert!(result
            .lines
            .iter()
            .any(|l| l.text == "You are selling the top products already!"));
        assert!(result
            .lines
            .iter()
            .any(|l| l.text == "Consider discontinue stocking:"));
    }

    #[test]
    fn suggestions_are_disjoint_from_sold_and_repeatable() {
        let rows = dataset();
        let a = compare(&request("S1"), &rows).unwrap();
        let b = compare(&request("S1"), &rows).unwrap();
        assert_eq!(a, b);

        let suggestion = a.suggestion.unwrap();
        for missing in &suggestion.missing {
            assert!(!["A", "B"].contains(&missing.as_str()));
        }
    }

    #[test]
    fn top_n_clamps_to_available_rows() {
        let rows = dataset();
        let mut req = request("S1");
        req.top_n = 10;
        let result = compare(&req, &rows).unwrap();
        let store_lines = result
            .lines
            .iter()
            .skip_while(|l| !l.text.starts_with("Your top products"))
            .skip(1)
            .take_while(|l| !l.is_header())
            .count();
        assert_eq!(store_lines, 2);
    }

    #[test]
    fn unknown_store_and_zero_top_n_are_errors() {
        let rows = dataset();
        assert!(matches!(
            compare(&request("NOPE"), &rows),
            Err(AnalyticsError::UnknownStore(_))
        ));

        let mut req = request("S1");
        req.top_n = 0;
        assert!(matches!(
            compare(&req, &rows),
            Err(AnalyticsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn malformed_rows_fail_fast() {
        let mut rows = dataset();
        rows.push(row("S1", 3, "Q", -1.0));
        assert!(matches!(
            compare(&request("S1"), &rows),
            Err(AnalyticsError::MalformedRow { .. })
        ));
    }
}
