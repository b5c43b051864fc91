use std::fmt::Write;
use stockwise_core::analytics::price::PriceAnalysis;
use stockwise_core::analytics::recommend::ComparisonResult;

/// Headers flush left, detail lines indented.
pub fn comparison(result: &ComparisonResult) -> String {
    let mut out = String::new();
    for line in &result.lines {
        if line.is_header() {
            let _ = writeln!(out, "{}", line.text);
        } else {
            let _ = writeln!(out, "  {}", line.text);
        }
    }
    out
}

pub fn price_analysis(description: &str, analysis: &PriceAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{description}");

    let formatted = analysis.estimate.formatted();
    match (formatted.best_price, formatted.best_revenue, formatted.best_sales) {
        (Some(price), revenue, sales) => {
            let _ = writeln!(out, "best price:   ${price}");
            let _ = writeln!(out, "best revenue: ${}", revenue.unwrap_or_else(|| "-".into()));
            let _ = writeln!(out, "best sales:   {}", sales.unwrap_or_else(|| "-".into()));
        }
        _ => {
            let _ = writeln!(out, "not enough distinct prices to estimate");
        }
    }

    if !analysis.points.is_empty() {
        let _ = writeln!(out, "{:>10} {:>12} {:>10}", "price", "avg units", "revenue");
        for p in &analysis.points {
            let _ = writeln!(
                out,
                "{:>10.2} {:>12.2} {:>10.2}",
                p.unit_price, p.units_sold, p.revenue
            );
        }
    }
    out
}
