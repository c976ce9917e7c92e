use anyhow::Result;
use polars::prelude::*;

use crate::timeframe::Timeframe;

/// Rolling std at or below this is treated as zero.
pub const STD_EPSILON: f64 = 1e-12;

/// Trailing window measured in samples of the series it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    pub size: usize,
    pub min_periods: usize,
}

impl RollingWindow {
    pub fn new(size: usize, min_periods: usize) -> Self {
        Self {
            size: size.max(1),
            min_periods: min_periods.max(1),
        }
    }

    /// `base_window_minutes` expressed in bars of `timeframe`, needing a sixth of it to be valid.
    pub fn for_timeframe(base_window_minutes: usize, timeframe: Timeframe) -> Self {
        let size = (base_window_minutes / timeframe.minutes()).max(1);
        Self::new(size, size / 6)
    }

    fn options(&self) -> RollingOptions {
        RollingOptions {
            window_size: Duration::parse(&format!("{}i", self.size)),
            min_periods: self.min_periods,
            ..Default::default()
        }
    }
}

/// `(x - mean) / std` over the trailing window, including the current sample.
/// Undefined values (too few samples, zero std) become 0.
pub fn zscore_expr(source: &str, window: RollingWindow) -> Expr {
    let mean = col(source).rolling_mean(window.options());
    let std = col(source).rolling_std(window.options());

    when(std.clone().gt(lit(STD_EPSILON)))
        .then((col(source) - mean) / std)
        .otherwise(lit(0.0))
        .fill_null(lit(0.0))
}

/// Append one z-score column per `(source, alias)` pair in a single lazy pass.
pub fn with_zscores(df: DataFrame, specs: &[(&str, &str)], window: RollingWindow) -> Result<DataFrame> {
    let exprs: Vec<Expr> = specs
        .iter()
        .map(|(source, alias)| zscore_expr(source, window).alias(alias))
        .collect();

    let df = df.lazy().with_columns(exprs).collect()?;
    Ok(df)
}

pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()).unwrap_or(0.0))
        .collect();
    Ok(values)
}

pub fn rolling_zscore(values: &[f64], window: RollingWindow) -> Result<Vec<f64>> {
    let df = DataFrame::new(vec![Series::new("value", values)])?;
    let df = with_zscores(df, &[("value", "z")], window)?;
    column_values(&df, "z")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_zscore(values: &[f64], window: RollingWindow) -> Vec<f64> {
        (0..values.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(window.size);
                let slice = &values[start..=i];
                if slice.len() < window.min_periods || slice.len() < 2 {
                    return 0.0;
                }
                let n = slice.len() as f64;
                let mean = slice.iter().sum::<f64>() / n;
                let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                let std = var.sqrt();
                if std > STD_EPSILON { (values[i] - mean) / std } else { 0.0 }
            })
            .collect()
    }

    fn wobble(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 37 % 11) as f64) * 0.5 + (i as f64) * 0.01).collect()
    }

    #[test]
    fn window_sizes_per_timeframe() {
        assert_eq!(RollingWindow::for_timeframe(360, Timeframe::M1), RollingWindow::new(360, 60));
        assert_eq!(RollingWindow::for_timeframe(360, Timeframe::M5), RollingWindow::new(72, 12));
        assert_eq!(RollingWindow::for_timeframe(360, Timeframe::M15), RollingWindow::new(24, 4));
        assert_eq!(RollingWindow::for_timeframe(5, Timeframe::M15).min_periods, 1);
    }

    #[test]
    fn output_length_matches_input() {
        let values = wobble(50);
        let z = rolling_zscore(&values, RollingWindow::new(10, 4)).unwrap();
        assert_eq!(z.len(), values.len());
    }

    #[test]
    fn zero_until_min_periods() {
        let values = wobble(40);
        let z = rolling_zscore(&values, RollingWindow::new(20, 8)).unwrap();
        assert!(z[..7].iter().all(|v| *v == 0.0));
        assert!(z[7..].iter().any(|v| *v != 0.0));
    }

    #[test]
    fn constant_series_is_neutral() {
        let z = rolling_zscore(&[1.0; 30], RollingWindow::new(10, 2)).unwrap();
        assert!(z.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn matches_trailing_sample_statistics() {
        let values = wobble(120);
        let window = RollingWindow::new(24, 4);
        let z = rolling_zscore(&values, window).unwrap();
        let expected = naive_zscore(&values, window);
        for (a, b) in z.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn several_columns_in_one_pass() {
        let df = DataFrame::new(vec![
            Series::new("a", wobble(30)),
            Series::new("b", vec![2.0; 30]),
        ])
        .unwrap();
        let df = with_zscores(df, &[("a", "z_a"), ("b", "z_b")], RollingWindow::new(10, 2)).unwrap();
        assert_eq!(column_values(&df, "z_a").unwrap().len(), 30);
        assert!(column_values(&df, "z_b").unwrap().iter().all(|v| *v == 0.0));
    }
}
