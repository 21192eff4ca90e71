//! Correlation statistics

use crate::table::Table;
use serde_json::Value;

/// Pearson correlation of two equally long samples. `None` with fewer than
/// two points or when either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    Some(r.clamp(-1.0, 1.0))
}

/// Pearson correlation between two columns, over rows where both are numeric.
pub fn column_correlation(table: &Table, x: &str, y: &str) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = table
        .rows
        .iter()
        .filter_map(|row| {
            let a = row.get(x).and_then(Value::as_f64)?;
            let b = row.get(y).and_then(Value::as_f64)?;
            Some((a, b))
        })
        .unzip();
    pearson(&xs, &ys)
}

/// "Strong" above 0.7, "Moderate" above 0.3, else "Weak" (on |r|).
pub fn correlation_strength(r: f64) -> &'static str {
    let magnitude = r.abs();
    if magnitude > 0.7 {
        "Strong"
    } else if magnitude > 0.3 {
        "Moderate"
    } else {
        "Weak"
    }
}

pub fn correlation_direction(r: f64) -> &'static str {
    if r >= 0.0 {
        "positive"
    } else {
        "negative"
    }
}
