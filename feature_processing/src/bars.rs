use data_ingestion::MarketRow;

use crate::timeframe::Timeframe;

/// OHLCV bar on some timeframe.
///
/// `effective_time` is the open timestamp of the last 1-minute row the bar contains:
/// the first base-cadence instant at which the bar is fully known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub start: i64,
    pub effective_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub rows: usize,
}

impl Bar {
    fn from_row(start: i64, row: &MarketRow) -> Self {
        Self {
            start,
            effective_time: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            rows: 1,
        }
    }

    fn absorb(&mut self, row: &MarketRow) {
        self.high = self.high.max(row.high);
        self.low = self.low.min(row.low);
        self.close = row.close;
        self.volume += row.volume;
        self.effective_time = row.timestamp;
        self.rows += 1;
    }

    pub fn is_complete(&self, timeframe: Timeframe) -> bool {
        self.rows == timeframe.minutes()
    }
}

/// Every 1-minute row as its own bar.
pub fn minute_bars(rows: &[MarketRow]) -> Vec<Bar> {
    rows.iter().map(|r| Bar::from_row(r.timestamp, r)).collect()
}

/// Aggregate time-ordered 1-minute rows into `timeframe` bars aligned on epoch multiples.
/// open = first, high = max, low = min, close = last, volume = sum.
/// Buckets with no rows never appear; buckets missing any minute are dropped.
pub fn resample(rows: &[MarketRow], timeframe: Timeframe) -> Vec<Bar> {
    if timeframe == Timeframe::M1 {
        return minute_bars(rows);
    }

    let span = timeframe.millis();
    let mut bars: Vec<Bar> = Vec::new();
    let mut current: Option<Bar> = None;

    for row in rows {
        let start = row.timestamp.div_euclid(span) * span;
        match current.as_mut() {
            Some(bar) if bar.start == start => bar.absorb(row),
            _ => {
                if let Some(bar) = current.take() {
                    bars.push(bar);
                }
                current = Some(Bar::from_row(start, row));
            }
        }
    }
    if let Some(bar) = current.take() {
        bars.push(bar);
    }

    bars.retain(|b| b.is_complete(timeframe));
    bars
}
