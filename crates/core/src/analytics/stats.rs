//! Small numeric helpers for the price histogram fit.

use std::f64::consts::PI;

/// `n` evenly spaced values over `[start, stop]`; the last value is exactly `stop`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            out[n - 1] = stop;
            out
        }
    }
}

/// Right-inclusive digitization: returns `i` such that `edges[i-1] < x <= edges[i]`.
/// Values at or below the first edge map to 0, values above the last to `edges.len()`.
pub fn digitize_right(x: f64, edges: &[f64]) -> usize {
    edges.partition_point(|e| *e < x)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (maximum-likelihood estimate).
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * PI).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median of `values` per half-open bin `[edges[i], edges[i+1])`; the last bin is
/// closed. Empty bins and values outside the edge range yield `None`.
pub fn binned_median(xs: &[f64], values: &[f64], edges: &[f64]) -> Vec<Option<f64>> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let last = edges.len() - 2;
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); edges.len() - 1];
    for (&x, &v) in xs.iter().zip(values) {
        if x < edges[0] || x > edges[edges.len() - 1] {
            continue;
        }
        let idx = edges.partition_point(|e| *e <= x).saturating_sub(1).min(last);
        buckets[idx].push(v);
    }
    buckets.iter().map(|b| median(b)).collect()
}

/// First index holding the maximum; NaN never wins.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            None if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_quarters() {
        assert_eq!(linspace(2.0, 3.0, 5), vec![2.0, 2.25, 2.5, 2.75, 3.0]);
        assert_eq!(linspace(3.0, 3.0, 1), vec![3.0]);
    }

    #[test]
    fn digitize_is_right_inclusive() {
        let edges = [2.0, 2.25, 2.5];
        assert_eq!(digitize_right(1.99, &edges), 0);
        assert_eq!(digitize_right(2.0, &edges), 0);
        assert_eq!(digitize_right(2.25, &edges), 1);
        assert_eq!(digitize_right(2.49, &edges), 2);
        assert_eq!(digitize_right(2.6, &edges), 3);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn binned_median_closes_last_bin() {
        let edges = [2.0, 2.5, 3.0];
        let xs = [1.5, 2.1, 2.4, 3.0];
        let ys = [100.0, 1.0, 3.0, 7.0];
        assert_eq!(binned_median(&xs, &ys, &edges), vec![Some(2.0), Some(7.0)]);
        assert!(binned_median(&xs, &ys, &[2.0]).is_empty());
    }

    #[test]
    fn argmax_takes_first_maximum() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(argmax(&[f64::NAN, 0.5]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn population_std() {
        let values = [0.0, 2.0, 4.0];
        let m = mean(&values).unwrap();
        assert!((std_dev(&values, m) - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
