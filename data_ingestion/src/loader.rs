use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use chrono::{DateTime, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::IoConfig;
use crate::error::DataIngestionError;

pub const MINUTE_MS: i64 = 60_000;

/// Numeric input columns, in the order they are stored on [`MarketRow`].
pub const NUMERIC_COLUMNS: [&str; 10] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "top_bid_price",
    "top_ask_price",
    "spread",
    "bid_ask_ratio",
    "final_sentiment_score",
];

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// One minute of market data: OHLCV, top of book and the external sentiment score.
/// `timestamp` is epoch milliseconds of the candle open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub top_bid_price: f64,
    pub top_ask_price: f64,
    pub spread: f64,
    pub bid_ask_ratio: f64,
    pub final_sentiment_score: f64,
}

impl MarketRow {
    pub fn from_values(timestamp: i64, v: [f64; 10]) -> Self {
        Self {
            timestamp,
            open: v[0],
            high: v[1],
            low: v[2],
            close: v[3],
            volume: v[4],
            top_bid_price: v[5],
            top_ask_price: v[6],
            spread: v[7],
            bid_ask_ratio: v[8],
            final_sentiment_score: v[9],
        }
    }

    /// Values in [`NUMERIC_COLUMNS`] order.
    pub fn values(&self) -> [f64; 10] {
        [
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.top_bid_price,
            self.top_ask_price,
            self.spread,
            self.bid_ask_ratio,
            self.final_sentiment_score,
        ]
    }
}

pub fn required_columns(timestamp_column: &str) -> Vec<String> {
    std::iter::once(timestamp_column)
        .chain(NUMERIC_COLUMNS.iter().copied())
        .map(str::to_string)
        .collect()
}

pub fn load_market_rows(config: &IoConfig) -> Result<Vec<MarketRow>, DataIngestionError> {
    info!("Loading market table from {}", config.input_path);
    let file = File::open(&config.input_path)?;
    read_market_rows(file, &config.timestamp_column)
}

/// Read, sort, de-duplicate and gap-fill a raw market table.
///
/// A missing required column aborts with the full list of missing names. Row-level
/// problems are resolved without failing the table: rows whose timestamp cannot be
/// parsed are dropped, short records read as blank cells, and numeric gaps are
/// forward-filled, then back-filled, then zeroed.
pub fn read_market_rows<R: Read>(
    reader: R,
    timestamp_column: &str,
) -> Result<Vec<MarketRow>, DataIngestionError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

    let missing: Vec<String> = required_columns(timestamp_column)
        .into_iter()
        .filter(|c| !index.contains_key(c.as_str()))
        .collect();
    if !missing.is_empty() {
        return Err(DataIngestionError::MissingColumns(missing));
    }

    let ts_idx = index[timestamp_column];
    let value_idx: Vec<usize> = NUMERIC_COLUMNS.iter().map(|c| index[*c]).collect();

    let mut raw: Vec<(i64, [Option<f64>; 10])> = Vec::new();
    let mut unparseable = 0usize;
    let mut bad_timestamps = 0usize;
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let ts_text = record.get(ts_idx).unwrap_or_default();
        let Some(timestamp) = parse_timestamp(ts_text) else {
            debug!("Unparseable timestamp {:?} at data row {}", ts_text, row + 1);
            bad_timestamps += 1;
            continue;
        };

        let mut values = [None; 10];
        for (slot, idx) in values.iter_mut().zip(&value_idx) {
            let text = record.get(*idx).unwrap_or_default();
            *slot = parse_number(text);
            if slot.is_none() && !is_blank(text) {
                unparseable += 1;
            }
        }
        raw.push((timestamp, values));
    }

    if bad_timestamps > 0 {
        warn!("Dropped {} rows with unparseable timestamps", bad_timestamps);
    }
    if raw.is_empty() {
        return Err(DataIngestionError::EmptyInput);
    }
    if unparseable > 0 {
        warn!("{} numeric cells could not be parsed and were treated as missing", unparseable);
    }

    raw.sort_by_key(|(ts, _)| *ts);
    let before = raw.len();
    raw.dedup_by_key(|(ts, _)| *ts);
    if raw.len() < before {
        warn!("Dropped {} rows with duplicate timestamps", before - raw.len());
    }

    let filled = fill_gaps(&raw);
    let rows: Vec<MarketRow> = raw
        .iter()
        .zip(filled)
        .map(|((ts, _), values)| MarketRow::from_values(*ts, values))
        .collect();

    let invalid = rows.iter().filter(|r| !validate_row(r)).count();
    if invalid > 0 {
        warn!("{} rows carry negative prices or volume; kept as-is", invalid);
    }

    let gaps = count_cadence_gaps(&rows);
    if gaps > 0 {
        warn!("{} cadence gaps found (consecutive rows not one minute apart)", gaps);
    }

    info!(
        "Loaded {} rows spanning {} .. {}",
        rows.len(),
        format_timestamp(rows[0].timestamp),
        format_timestamp(rows[rows.len() - 1].timestamp)
    );
    Ok(rows)
}

/// Integer epoch milliseconds, RFC 3339, or a naive UTC date-time.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
}

pub fn format_timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn validate_row(row: &MarketRow) -> bool {
    let mut is_valid = true;
    if row.volume < 0.0 {
        debug!("Invalid volume at {}", row.timestamp);
        is_valid = false;
    }

    for (name, value) in [("open", row.open), ("high", row.high), ("low", row.low), ("close", row.close)] {
        if value < 0.0 {
            debug!("{} cannot be negative at {}", name, row.timestamp);
            is_valid = false;
        }
    }

    if row.high < row.low {
        debug!("High below low at {}", row.timestamp);
        is_valid = false;
    }

    is_valid
}

pub fn count_cadence_gaps(rows: &[MarketRow]) -> usize {
    rows.windows(2)
        .filter(|w| w[1].timestamp - w[0].timestamp != MINUTE_MS)
        .count()
}

fn is_blank(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nan") || text.eq_ignore_ascii_case("null")
}

fn parse_number(text: &str) -> Option<f64> {
    if is_blank(text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Per column: forward fill, back fill what leads the column, zero if the column is empty.
fn fill_gaps(raw: &[(i64, [Option<f64>; 10])]) -> Vec<[f64; 10]> {
    let mut out = vec![[0.0; 10]; raw.len()];
    for col in 0..NUMERIC_COLUMNS.len() {
        let first_valid = raw.iter().find_map(|(_, v)| v[col]).unwrap_or(0.0);
        let mut last = None;
        let mut filled = 0usize;
        for (i, (_, values)) in raw.iter().enumerate() {
            let value = match values[col] {
                Some(v) => {
                    last = Some(v);
                    v
                }
                None => {
                    filled += 1;
                    last.unwrap_or(first_valid)
                }
            };
            out[i][col] = value;
        }
        if filled > 0 {
            debug!("Filled {} missing values in {}", filled, NUMERIC_COLUMNS[col]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "timestamp,open,high,low,close,volume,top_bid_price,top_ask_price,spread,bid_ask_ratio,final_sentiment_score";

    #[test]
    fn missing_columns_are_all_reported() {
        let csv = "timestamp,open,high,low,close\n0,1,1,1,1\n";
        let err = read_market_rows(csv.as_bytes(), "timestamp").unwrap_err();
        match err {
            DataIngestionError::MissingColumns(missing) => {
                assert_eq!(
                    missing,
                    vec![
                        "volume",
                        "top_bid_price",
                        "top_ask_price",
                        "spread",
                        "bid_ask_ratio",
                        "final_sentiment_score"
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn custom_timestamp_column_is_required() {
        let csv = format!("{HEADER}\n0,1,1,1,1,1,1,1,1,1,0\n");
        let err = read_market_rows(csv.as_bytes(), "open_time").unwrap_err();
        assert!(matches!(err, DataIngestionError::MissingColumns(ref m) if m == &vec!["open_time".to_string()]));
    }

    #[test]
    fn rows_are_sorted_and_deduplicated() {
        let csv = format!(
            "{HEADER}\n120000,3,3,3,3,1,1,1,1,1,0\n0,1,1,1,1,1,1,1,1,1,0\n60000,2,2,2,2,1,1,1,1,1,0\n60000,9,9,9,9,1,1,1,1,1,0\n"
        );
        let rows = read_market_rows(csv.as_bytes(), "timestamp").unwrap();
        let ts: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![0, 60_000, 120_000]);
        assert_eq!(rows[1].close, 2.0);
    }

    #[test]
    fn gaps_are_forward_then_back_filled() {
        let csv = format!(
            "{HEADER}\n0,1,1,1,,1,1,1,1,1,0\n60000,2,2,2,5,1,1,1,1,1,NaN\n120000,3,3,3,,1,1,1,1,1,0.5\n"
        );
        let rows = read_market_rows(csv.as_bytes(), "timestamp").unwrap();
        let close: Vec<f64> = rows.iter().map(|r| r.close).collect();
        assert_eq!(close, vec![5.0, 5.0, 5.0]);
        assert_eq!(rows[1].final_sentiment_score, 0.0);
        assert_eq!(rows[2].final_sentiment_score, 0.5);
    }

    #[test]
    fn empty_table_is_an_error() {
        let csv = format!("{HEADER}\n");
        assert!(matches!(
            read_market_rows(csv.as_bytes(), "timestamp"),
            Err(DataIngestionError::EmptyInput)
        ));
    }

    #[test]
    fn rows_with_bad_timestamps_are_dropped() {
        let csv = format!(
            "{HEADER}\n0,1,1,1,1,1,1,1,1,1,0\n60000,2,2,2,2,1,1,1,1,1,0\n--,7,7,7,7,1,1,1,1,1,0\n180000,4,4,4,4,1,1,1,1,1,0\n"
        );
        let rows = read_market_rows(csv.as_bytes(), "timestamp").unwrap();
        let ts: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![0, 60_000, 180_000]);
        assert!(rows.iter().all(|r| r.close != 7.0));
    }

    #[test]
    fn only_bad_timestamps_is_empty_input() {
        let csv = format!("{HEADER}\nyesterday,1,1,1,1,1,1,1,1,1,0\n");
        assert!(matches!(
            read_market_rows(csv.as_bytes(), "timestamp"),
            Err(DataIngestionError::EmptyInput)
        ));
    }

    #[test]
    fn short_record_reads_as_blank_cells() {
        let csv = format!("{HEADER}\n0,1,1,1,1,1,1,1,1,1,0.5\n60000,2,2,2,2,1,1,1,1,1\n120000,3,3,3,3,1,1,1,1,1,0.2\n");
        let rows = read_market_rows(csv.as_bytes(), "timestamp").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].close, 2.0);
        // the missing trailing sentiment cell is forward-filled
        assert_eq!(rows[1].final_sentiment_score, 0.5);
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp("1970-01-01 00:01:00"), Some(60_000));
        assert_eq!(parse_timestamp("1970-01-01T00:02:00"), Some(120_000));
        assert_eq!(parse_timestamp("1970-01-01T00:00:30.5Z"), Some(30_500));
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn negative_prices_are_flagged_not_rejected() {
        let mut row = MarketRow::from_values(0, [1.0; 10]);
        assert!(validate_row(&row));
        row.close = -1.0;
        assert!(!validate_row(&row));
    }

    #[test]
    fn cadence_gaps_are_counted() {
        let rows: Vec<MarketRow> = [0, 60_000, 180_000, 240_000]
            .iter()
            .map(|ts| MarketRow::from_values(*ts, [1.0; 10]))
            .collect();
        assert_eq!(count_cadence_gaps(&rows), 1);
    }
}
