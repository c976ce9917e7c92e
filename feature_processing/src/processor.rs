use anyhow::{Result, bail};
use log::{debug, info, warn};
use polars::prelude::*;
use serde::Deserialize;

use data_ingestion::MarketRow;

use crate::align::{align_values, asof_indices};
use crate::bars::{Bar, resample};
use crate::misc::{FeatureRow, TimeframeValues};
use crate::rolling::{RollingWindow, column_values, with_zscores};
use crate::timeframe::Timeframe;

/// Guards the order-book ratios against a zero denominator.
pub const PRICE_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// Trailing window in minutes; divided by the timeframe length to get bars.
    pub base_window_minutes: usize,
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        let coarsest = Timeframe::M15;
        if self.base_window_minutes / coarsest.minutes() < 2 {
            bail!(
                "features.base_window_minutes must cover at least two {} bars, got {}",
                coarsest.label(),
                self.base_window_minutes
            );
        }
        Ok(())
    }
}

pub fn price_return(open: f64, close: f64) -> f64 {
    if open == 0.0 { 0.0 } else { (close - open) / open }
}

/// Where the close sits inside the candle range, 0.5 for a flat candle. A close outside
/// `[low, high]` is clamped into `[0, 1]`; see [`close_outside_range`].
pub fn close_position(high: f64, low: f64, close: f64) -> f64 {
    let range = high - low;
    if range <= 0.0 {
        0.5
    } else {
        ((close - low) / range).clamp(0.0, 1.0)
    }
}

/// A bar whose close lies outside its own non-flat range, so its close_position is clamped.
pub fn close_outside_range(bar: &Bar) -> bool {
    bar.high > bar.low && (bar.close < bar.low || bar.close > bar.high)
}

pub fn order_imbalance(bid: f64, ask: f64) -> f64 {
    (bid - ask) / (bid + ask + PRICE_EPSILON)
}

/// Derived fields for one bar series. z-scores are computed over the bars themselves.
pub fn timeframe_features(bars: &[Bar], window: RollingWindow) -> Result<Vec<TimeframeValues>> {
    if bars.is_empty() {
        return Ok(Vec::new());
    }

    let returns: Vec<f64> = bars.iter().map(|b| price_return(b.open, b.close)).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let df = DataFrame::new(vec![
        Series::new("price_return", &returns),
        Series::new("volume", volumes),
    ])?;
    let df = with_zscores(df, &[("price_return", "z_return"), ("volume", "z_volume")], window)?;
    let z_return = column_values(&df, "z_return")?;
    let z_volume = column_values(&df, "z_volume")?;

    let clamped = bars.iter().filter(|b| close_outside_range(b)).count();
    if clamped > 0 {
        warn!("{} bars close outside [low, high]; close_position clamped to [0, 1]", clamped);
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, b)| TimeframeValues {
            price_return: returns[i],
            z_return: z_return[i],
            z_volume: z_volume[i],
            close_position: close_position(b.high, b.low, b.close),
        })
        .collect();
    Ok(values)
}

/// Builds the base-cadence feature table from cleaned 1-minute rows.
pub struct FeatureProcessor {
    config: FeatureConfig,
}

impl FeatureProcessor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, rows: &[MarketRow]) -> Result<Vec<FeatureRow>> {
        info!("🚀Computing multi-timeframe features for {} rows...", rows.len());
        let base_times: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
        let mut frames = vec![[TimeframeValues::NEUTRAL; 3]; rows.len()];

        for timeframe in Timeframe::ALL {
            let bars = resample(rows, timeframe);
            let window = RollingWindow::for_timeframe(self.config.base_window_minutes, timeframe);
            let values = timeframe_features(&bars, window)?;

            let effective: Vec<i64> = bars.iter().map(|b| b.effective_time).collect();
            let indices = asof_indices(&base_times, &effective);
            let unmatched = indices.iter().filter(|i| i.is_none()).count();
            let aligned = align_values(&indices, &values, TimeframeValues::NEUTRAL);
            for (slot, v) in frames.iter_mut().zip(aligned) {
                slot[timeframe.index()] = v;
            }

            info!(
                "{} bars: {} (window {}, min periods {})",
                timeframe.label(),
                bars.len(),
                window.size,
                window.min_periods
            );
            debug!("{} rows precede the first completed {} bar", unmatched, timeframe.label());
        }

        let book = self.order_book_zscores(rows)?;

        let features = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let imbalance = order_imbalance(r.top_bid_price, r.top_ask_price);
                FeatureRow {
                    market: *r,
                    frames: frames[i],
                    z_bid_ask_ratio: book[0][i],
                    z_spread: book[1][i],
                    z_top_bid: book[2][i],
                    order_imbalance: imbalance,
                    spread_pct: r.spread / (r.close + PRICE_EPSILON),
                    volume_imbalance: imbalance * r.volume,
                }
            })
            .collect();

        info!("Feature table ready✅");
        Ok(features)
    }

    /// Base-cadence z-scores of bid/ask ratio, spread and top bid.
    fn order_book_zscores(&self, rows: &[MarketRow]) -> Result<[Vec<f64>; 3]> {
        if rows.is_empty() {
            return Ok([Vec::new(), Vec::new(), Vec::new()]);
        }
        let window = RollingWindow::for_timeframe(self.config.base_window_minutes, Timeframe::M1);
        let df = DataFrame::new(vec![
            Series::new("bid_ask_ratio", rows.iter().map(|r| r.bid_ask_ratio).collect::<Vec<f64>>()),
            Series::new("spread", rows.iter().map(|r| r.spread).collect::<Vec<f64>>()),
            Series::new("top_bid_price", rows.iter().map(|r| r.top_bid_price).collect::<Vec<f64>>()),
        ])?;
        let df = with_zscores(
            df,
            &[
                ("bid_ask_ratio", "z_bid_ask_ratio"),
                ("spread", "z_spread"),
                ("top_bid_price", "z_top_bid"),
            ],
            window,
        )?;
        Ok([
            column_values(&df, "z_bid_ask_ratio")?,
            column_values(&df, "z_spread")?,
            column_values(&df, "z_top_bid")?,
        ])
    }
}
