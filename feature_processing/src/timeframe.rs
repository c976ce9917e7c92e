use serde::{Deserialize, Serialize};

use data_ingestion::MINUTE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M1, Timeframe::M5, Timeframe::M15];

    pub fn minutes(self) -> usize {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
        }
    }

    pub fn millis(self) -> i64 {
        self.minutes() as i64 * MINUTE_MS
    }

    /// Position in [`Timeframe::ALL`], used to index per-timeframe arrays.
    pub fn index(self) -> usize {
        match self {
            Timeframe::M1 => 0,
            Timeframe::M5 => 1,
            Timeframe::M15 => 2,
        }
    }

    /// Column-name suffix. 1m columns carry no suffix in the output table.
    pub fn suffix(self) -> &'static str {
        match self {
            Timeframe::M1 => "",
            Timeframe::M5 => "_5m",
            Timeframe::M15 => "_15m",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
        }
    }
}
