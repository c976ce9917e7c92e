//! Deterministic 1-minute series for exercising the feature and label stages.

use data_ingestion::{MINUTE_MS, MarketRow};

/// 2023-11-14 22:00:00 UTC, aligned to a 15-minute boundary.
pub const START_MS: i64 = 1_699_999_200_000;
pub const BASE_PRICE: f64 = 100.0;
pub const BASE_VOLUME: f64 = 1_000.0;
pub const SPIKE_RETURN: f64 = 0.05;

fn wiggle(t: usize, mul: usize, modulus: usize) -> f64 {
    let centre = (modulus / 2) as f64;
    ((t * mul) % modulus) as f64 - centre
}

/// Quiet market: small bounded oscillations in return, volume, book and sentiment.
pub fn baseline_rows(n: usize) -> Vec<MarketRow> {
    (0..n)
        .map(|t| {
            let open = BASE_PRICE;
            let close = open * (1.0 + 0.0004 * wiggle(t, 3, 7));
            MarketRow {
                timestamp: START_MS + t as i64 * MINUTE_MS,
                open,
                high: open.max(close) * 1.0005,
                low: open.min(close) * 0.9995,
                close,
                volume: BASE_VOLUME + 10.0 * wiggle(t, 7, 13),
                top_bid_price: close - 0.05,
                top_ask_price: close + 0.05,
                spread: 0.1,
                bid_ask_ratio: 1.0 + 0.005 * wiggle(t, 5, 9),
                final_sentiment_score: 0.025 * wiggle(t, 11, 5),
            }
        })
        .collect()
}

/// Bullish spike at `at`: +5% candle closing near its high, 10x volume, bid-heavy book,
/// strong positive sentiment. Prices after the spike are shifted to the new level, and
/// the close `horizon` rows later sits slightly above the spike close.
pub fn inject_pump(rows: &mut [MarketRow], at: usize, horizon: usize) {
    let level = 1.0 + SPIKE_RETURN;
    for row in rows.iter_mut().skip(at + 1) {
        row.open *= level;
        row.high *= level;
        row.low *= level;
        row.close *= level;
        row.top_bid_price *= level;
        row.top_ask_price *= level;
    }

    let spike = &mut rows[at];
    spike.open = BASE_PRICE;
    spike.close = BASE_PRICE * level;
    spike.high = spike.close + 0.1;
    spike.low = BASE_PRICE - 0.1;
    spike.volume = BASE_VOLUME * 10.0;
    spike.bid_ask_ratio = 3.0;
    spike.final_sentiment_score = 0.8;

    let spike_close = spike.close;
    if let Some(later) = rows.get_mut(at + horizon) {
        later.close = spike_close * 1.005;
        later.high = later.high.max(later.close);
    }
}

/// Drop the close `horizon` rows after `at` below the close at `at`.
pub fn inject_reversal(rows: &mut [MarketRow], at: usize, horizon: usize) {
    let reference = rows[at].close;
    if let Some(later) = rows.get_mut(at + horizon) {
        later.close = reference * 0.95;
        later.low = later.low.min(later.close);
    }
}
