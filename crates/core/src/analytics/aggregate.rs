use crate::domain::transaction::TransactionRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Granularity at which sales are summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// {peer_cluster, store, category, description, period}
    Store,
    /// {peer_cluster, category, description, period}
    Cluster,
    /// {category, description, period}
    Network,
}

impl Scope {
    fn key(self, row: &TransactionRecord) -> GroupKey {
        let (peer_cluster, store_id) = match self {
            Scope::Store => (Some(row.peer_cluster), Some(row.store_id.clone())),
            Scope::Cluster => (Some(row.peer_cluster), None),
            Scope::Network => (None, None),
        };
        GroupKey {
            peer_cluster,
            store_id,
            category: row.category.clone(),
            description: row.description.clone(),
            period: row.period.clone(),
        }
    }

    /// Group ordering: scope keys descending, then units descending.
    /// Remaining ties fall back to description ascending so output is stable.
    fn rank(self, a: &RankedProductRow, b: &RankedProductRow) -> Ordering {
        let scope_keys = match self {
            Scope::Store => b.key.store_id.cmp(&a.key.store_id),
            Scope::Cluster => b.key.peer_cluster.cmp(&a.key.peer_cluster),
            Scope::Network => Ordering::Equal,
        };
        scope_keys
            .then_with(|| b.key.category.cmp(&a.key.category))
            .then_with(|| b.key.period.cmp(&a.key.period))
            .then_with(|| b.units_sold.total_cmp(&a.units_sold))
            .then_with(|| a.key.description.cmp(&b.key.description))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_cluster: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    pub category: String,
    pub description: String,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProductRow {
    #[serde(flatten)]
    pub key: GroupKey,
    pub units_sold: f64,
    /// `None` unless every summed row carried revenue or a unit price.
    pub revenue: Option<f64>,
    /// Store views only: this row's fraction of the filtered group's units.
    pub share_of_sold: Option<f64>,
    /// Store views only: running sum of `share_of_sold` in rank order.
    pub cumulative_share: Option<f64>,
}

impl RankedProductRow {
    pub fn description(&self) -> &str {
        &self.key.description
    }
}

/// Which slice of a grouped view the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter<'a> {
    Store(&'a str),
    Cluster(i64),
    Network,
}

impl ScopeFilter<'_> {
    pub fn scope(&self) -> Scope {
        match self {
            ScopeFilter::Store(_) => Scope::Store,
            ScopeFilter::Cluster(_) => Scope::Cluster,
            ScopeFilter::Network => Scope::Network,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub scope: ScopeFilter<'a>,
    pub category: &'a str,
    pub period: &'a str,
}

impl Selection<'_> {
    fn matches(&self, key: &GroupKey) -> bool {
        let scope_ok = match self.scope {
            ScopeFilter::Store(store_id) => key.store_id.as_deref() == Some(store_id),
            ScopeFilter::Cluster(cluster) => key.peer_cluster == Some(cluster),
            ScopeFilter::Network => true,
        };
        scope_ok && key.category == self.category && key.period == self.period
    }
}

/// Sums sales rows per scope key and returns them in rank order.
pub fn group_and_rank(rows: &[TransactionRecord], scope: Scope) -> Vec<RankedProductRow> {
    // Revenue stays known only while every row in the group reports it.
    let mut groups: BTreeMap<GroupKey, (f64, Option<f64>)> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_sale()) {
        let key = scope.key(row);
        match groups.get_mut(&key) {
            Some(entry) => {
                entry.0 += row.units_sold;
                entry.1 = entry.1.zip(row.revenue()).map(|(a, b)| a + b);
            }
            None => {
                groups.insert(key, (row.units_sold, row.revenue()));
            }
        }
    }

    let mut out: Vec<RankedProductRow> = groups
        .into_iter()
        .map(|(key, (units_sold, revenue))| RankedProductRow {
            key,
            units_sold,
            revenue,
            share_of_sold: None,
            cumulative_share: None,
        })
        .collect();
    out.sort_by(|a, b| scope.rank(a, b));
    out
}

/// Groups, ranks, then keeps only the selected slice. Store slices also get
/// `share_of_sold` and `cumulative_share`.
pub fn aggregate(rows: &[TransactionRecord], selection: &Selection<'_>) -> Vec<RankedProductRow> {
    let scope = selection.scope.scope();
    let ranked: Vec<RankedProductRow> = group_and_rank(rows, scope)
        .into_iter()
        .filter(|r| selection.matches(&r.key))
        .collect();

    tracing::debug!(
        ?scope,
        category = selection.category,
        period = selection.period,
        rows = ranked.len(),
        "aggregated sales view"
    );

    match scope {
        Scope::Store => with_shares(ranked),
        Scope::Cluster | Scope::Network => ranked,
    }
}

/// Fills share columns over rows already in rank order. An empty or zero-total
/// group is returned untouched.
pub fn with_shares(mut rows: Vec<RankedProductRow>) -> Vec<RankedProductRow> {
    let total = total_units(&rows);
    if total <= 0.0 {
        return rows;
    }

    let mut running = 0.0;
    for row in &mut rows {
        let share = row.units_sold / total;
        running += share;
        row.share_of_sold = Some(share);
        row.cumulative_share = Some(running);
    }
    rows
}

pub fn total_units(rows: &[RankedProductRow]) -> f64 {
    rows.iter().map(|r| r.units_sold).sum()
}
