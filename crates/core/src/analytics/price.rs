use crate::analytics::error::AnalyticsError;
use crate::analytics::stats;
use crate::domain::transaction::{validate_records, TransactionRecord};
use serde::{Deserialize, Serialize};

/// Histogram resolution: bins per currency unit of price range.
pub const BINS_PER_UNIT: f64 = 4.0;

/// Upper bound on histogram edges, i.e. a price range of just under 25,000.
pub const MAX_PRICE_EDGES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuery<'a> {
    pub description: &'a str,
    pub peer_cluster: Option<i64>,
    pub period: Option<&'a str>,
}

impl<'a> PriceQuery<'a> {
    pub fn new(description: &'a str) -> Self {
        Self {
            description,
            peer_cluster: None,
            period: None,
        }
    }

    fn matches(&self, row: &TransactionRecord) -> bool {
        row.description == self.description
            && self.peer_cluster.map_or(true, |c| row.peer_cluster == c)
            && self.period.map_or(true, |p| row.period == p)
    }
}

/// One distinct price with the mean units sold at it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub unit_price: f64,
    pub units_sold: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub best_price: Option<f64>,
    pub best_revenue: Option<f64>,
    pub best_sales: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedEstimate {
    pub best_price: Option<String>,
    pub best_revenue: Option<String>,
    pub best_sales: Option<String>,
}

impl PriceEstimate {
    pub fn is_empty(&self) -> bool {
        self.best_price.is_none() && self.best_revenue.is_none() && self.best_sales.is_none()
    }

    /// Display strings: price to cents, revenue and sales as whole numbers.
    pub fn formatted(&self) -> FormattedEstimate {
        FormattedEstimate {
            best_price: self.best_price.map(|v| format!("{v:.2}")),
            best_revenue: self.best_revenue.map(|v| format!("{v:.0}")),
            best_sales: self.best_sales.map(|v| format!("{v:.0}")),
        }
    }
}

/// Bin layout and fitted density, aligned with `PriceAnalysis::points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistogram {
    pub edges: Vec<f64>,
    pub bin_indices: Vec<usize>,
    pub density: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub points: Vec<PricePoint>,
    pub estimate: PriceEstimate,
    pub histogram: Option<PriceHistogram>,
}

/// Filters to one product and collapses observations to one point per distinct
/// price, ordered by price.
pub fn subset(
    rows: &[TransactionRecord],
    query: &PriceQuery<'_>,
) -> Result<Vec<PricePoint>, AnalyticsError> {
    validate_records(rows)?;

    let mut observations: Vec<(f64, f64)> = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        if !query.matches(row) {
            continue;
        }
        match row.unit_price() {
            Some(price) => observations.push((price, row.units_sold)),
            // Zero-unit rows without a recorded price carry no observation.
            None if !row.is_sale() => {}
            None => {
                return Err(AnalyticsError::malformed(
                    idx,
                    "unit_price",
                    "requires unit_price or revenue",
                ))
            }
        }
    }
    observations.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut points: Vec<PricePoint> = Vec::new();
    let mut i = 0;
    while i < observations.len() {
        let price = observations[i].0;
        let group: Vec<f64> = observations[i..]
            .iter()
            .take_while(|(p, _)| *p == price)
            .map(|(_, units)| *units)
            .collect();
        i += group.len();
        let units_sold = stats::mean(&group).unwrap_or(0.0);
        points.push(PricePoint {
            unit_price: price,
            units_sold,
            revenue: price * units_sold,
        });
    }
    Ok(points)
}

pub fn estimate(
    rows: &[TransactionRecord],
    query: &PriceQuery<'_>,
) -> Result<PriceEstimate, AnalyticsError> {
    Ok(analyze(rows, query)?.estimate)
}

pub fn analyze(
    rows: &[TransactionRecord],
    query: &PriceQuery<'_>,
) -> Result<PriceAnalysis, AnalyticsError> {
    let points = subset(rows, query)?;
    let (estimate, histogram) = match fit(&points)? {
        Some((estimate, histogram)) => (estimate, Some(histogram)),
        None => {
            tracing::debug!(
                description = query.description,
                distinct_prices = points.len(),
                "not enough distinct prices to estimate"
            );
            (PriceEstimate::default(), None)
        }
    };
    Ok(PriceAnalysis {
        points,
        estimate,
        histogram,
    })
}

/// Fits a normal distribution to the histogram bin of each distinct price and
/// reads the estimate off the densest bin. `None` below two distinct prices.
///
/// `best_price` indexes the populated edges (`edges[unique(bins)]`) with the raw
/// bin index at the density peak. The two index spaces differ, so the result can
/// land on a neighbouring edge; this is kept as-is until the intended mapping is
/// confirmed. A raw index past the populated edges resolves to the last one.
///
/// Price ranges needing more than [`MAX_PRICE_EDGES`] edges are rejected with
/// `InvalidArgument` before anything is allocated.
pub fn fit(
    points: &[PricePoint],
) -> Result<Option<(PriceEstimate, PriceHistogram)>, AnalyticsError> {
    if points.len() < 2 {
        return Ok(None);
    }
    let edges = price_edges(points)?;
    Ok(fit_on_edges(points, edges))
}

/// Edges from `round(min)` to `ceil(max)`, `BINS_PER_UNIT` per currency unit.
fn price_edges(points: &[PricePoint]) -> Result<Vec<f64>, AnalyticsError> {
    let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.unit_price), hi.max(p.unit_price))
    });
    let min_price = lo.round_ties_even();
    let max_price = hi.ceil();

    let span = (max_price - min_price) * BINS_PER_UNIT;
    if !span.is_finite() || span >= MAX_PRICE_EDGES as f64 {
        return Err(AnalyticsError::InvalidArgument(format!(
            "price range {lo}..{hi} needs more than {MAX_PRICE_EDGES} histogram edges"
        )));
    }
    Ok(stats::linspace(min_price, max_price, span as usize + 1))
}

fn fit_on_edges(
    points: &[PricePoint],
    edges: Vec<f64>,
) -> Option<(PriceEstimate, PriceHistogram)> {
    let prices: Vec<f64> = points.iter().map(|p| p.unit_price).collect();
    let sales: Vec<f64> = points.iter().map(|p| p.units_sold).collect();
    let revenue: Vec<f64> = points.iter().map(|p| p.revenue).collect();

    let bin_indices: Vec<usize> = prices
        .iter()
        .map(|&x| stats::digitize_right(x, &edges))
        .collect();
    let bins_f: Vec<f64> = bin_indices.iter().map(|&b| b as f64).collect();

    let mean = stats::mean(&bins_f)?;
    let std = stats::std_dev(&bins_f, mean);
    let density: Vec<f64> = if std > 0.0 && std.is_finite() {
        bins_f.iter().map(|&b| stats::normal_pdf(b, mean, std)).collect()
    } else {
        tracing::warn!(mean, "zero-variance price bins; using point-mass density");
        bins_f.iter().map(|&b| if b == mean { 1.0 } else { 0.0 }).collect()
    };
    let peak = stats::argmax(&density)?;
    let peak_bin = bin_indices[peak];

    let mut populated_bins = bin_indices.clone();
    populated_bins.sort_unstable();
    populated_bins.dedup();
    let populated_edges: Vec<f64> = populated_bins
        .iter()
        .filter_map(|&b| edges.get(b).copied())
        .collect();
    let best_price = match populated_edges.get(peak_bin) {
        Some(&edge) => edge,
        None => {
            tracing::warn!(
                peak_bin,
                populated = populated_edges.len(),
                "peak bin index past populated edges; using last populated edge"
            );
            *populated_edges.last()?
        }
    };

    let at_peak = |values: &[f64]| -> Option<f64> {
        let binned = stats::binned_median(&prices, values, &edges)
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        match binned {
            Some(v) if v != 0.0 => Some(v),
            _ => {
                let in_peak_bin: Vec<f64> = bin_indices
                    .iter()
                    .zip(values)
                    .filter(|(b, _)| **b == peak_bin)
                    .map(|(_, v)| *v)
                    .collect();
                stats::median(&in_peak_bin)
            }
        }
    };

    let estimate = PriceEstimate {
        best_price: Some(best_price),
        best_revenue: at_peak(&revenue),
        best_sales: at_peak(&sales),
    };
    Some((
        estimate,
        PriceHistogram {
            edges,
            bin_indices,
            density,
        },
    ))
}
