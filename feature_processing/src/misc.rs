use anyhow::{Result, bail};
use serde::Serialize;

use data_ingestion::MarketRow;
use data_ingestion::loader::NUMERIC_COLUMNS;

use crate::timeframe::Timeframe;

/// Per-timeframe derived fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeframeValues {
    pub price_return: f64,
    pub z_return: f64,
    pub z_volume: f64,
    pub close_position: f64,
}

impl TimeframeValues {
    /// Used for base rows that precede the first completed coarser bar.
    pub const NEUTRAL: TimeframeValues = TimeframeValues {
        price_return: 0.0,
        z_return: 0.0,
        z_volume: 0.0,
        close_position: 0.5,
    };
}

/// A market row plus everything derived from it, at base cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub market: MarketRow,
    /// Indexed by [`Timeframe::index`].
    pub frames: [TimeframeValues; 3],
    pub z_bid_ask_ratio: f64,
    pub z_spread: f64,
    pub z_top_bid: f64,
    pub order_imbalance: f64,
    pub spread_pct: f64,
    pub volume_imbalance: f64,
}

impl FeatureRow {
    pub fn frame(&self, timeframe: Timeframe) -> &TimeframeValues {
        &self.frames[timeframe.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeField {
    PriceReturn,
    ZReturn,
    ZVolume,
    ClosePosition,
}

impl TimeframeField {
    pub const ALL: [TimeframeField; 4] = [
        TimeframeField::PriceReturn,
        TimeframeField::ZReturn,
        TimeframeField::ZVolume,
        TimeframeField::ClosePosition,
    ];

    fn stem(self) -> &'static str {
        match self {
            TimeframeField::PriceReturn => "price_return",
            TimeframeField::ZReturn => "z_return",
            TimeframeField::ZVolume => "z_volume",
            TimeframeField::ClosePosition => "close_position",
        }
    }

    fn read(self, values: &TimeframeValues) -> f64 {
        match self {
            TimeframeField::PriceReturn => values.price_return,
            TimeframeField::ZReturn => values.z_return,
            TimeframeField::ZVolume => values.z_volume,
            TimeframeField::ClosePosition => values.close_position,
        }
    }
}

/// One named column of the feature table, usable as a sequence channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Index into [`NUMERIC_COLUMNS`].
    Input(usize),
    Frame(Timeframe, TimeframeField),
    ZBidAskRatio,
    ZSpread,
    ZTopBid,
    OrderImbalance,
    SpreadPct,
    VolumeImbalance,
}

impl Channel {
    pub fn parse(name: &str) -> Option<Channel> {
        if let Some(i) = NUMERIC_COLUMNS.iter().position(|c| *c == name) {
            return Some(Channel::Input(i));
        }
        let fixed = match name {
            "z_bid_ask_ratio" => Some(Channel::ZBidAskRatio),
            "z_spread" => Some(Channel::ZSpread),
            "z_top_bid" => Some(Channel::ZTopBid),
            "order_imbalance" => Some(Channel::OrderImbalance),
            "spread_pct" => Some(Channel::SpreadPct),
            "volume_imbalance" => Some(Channel::VolumeImbalance),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }
        let name = name.strip_suffix("_1m").unwrap_or(name);
        for tf in Timeframe::ALL {
            for field in TimeframeField::ALL {
                if name == format!("{}{}", field.stem(), tf.suffix()) {
                    return Some(Channel::Frame(tf, field));
                }
            }
        }
        None
    }

    pub fn name(&self) -> String {
        match self {
            Channel::Input(i) => NUMERIC_COLUMNS[*i].to_string(),
            Channel::Frame(tf, field) => format!("{}{}", field.stem(), tf.suffix()),
            Channel::ZBidAskRatio => "z_bid_ask_ratio".into(),
            Channel::ZSpread => "z_spread".into(),
            Channel::ZTopBid => "z_top_bid".into(),
            Channel::OrderImbalance => "order_imbalance".into(),
            Channel::SpreadPct => "spread_pct".into(),
            Channel::VolumeImbalance => "volume_imbalance".into(),
        }
    }

    pub fn value(&self, row: &FeatureRow) -> f64 {
        match self {
            Channel::Input(i) => row.market.values()[*i],
            Channel::Frame(tf, field) => field.read(row.frame(*tf)),
            Channel::ZBidAskRatio => row.z_bid_ask_ratio,
            Channel::ZSpread => row.z_spread,
            Channel::ZTopBid => row.z_top_bid,
            Channel::OrderImbalance => row.order_imbalance,
            Channel::SpreadPct => row.spread_pct,
            Channel::VolumeImbalance => row.volume_imbalance,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Channel::Input(_))
    }
}

/// Derived columns in labeled-table order.
pub fn derived_channels() -> Vec<Channel> {
    let m1 = |field| Channel::Frame(Timeframe::M1, field);
    let mut channels = vec![
        m1(TimeframeField::PriceReturn),
        m1(TimeframeField::ZReturn),
        m1(TimeframeField::ZVolume),
        Channel::ZBidAskRatio,
        Channel::ZSpread,
        Channel::ZTopBid,
        m1(TimeframeField::ClosePosition),
        Channel::OrderImbalance,
        Channel::SpreadPct,
        Channel::VolumeImbalance,
    ];
    for tf in [Timeframe::M5, Timeframe::M15] {
        channels.extend(TimeframeField::ALL.iter().map(|f| Channel::Frame(tf, *f)));
    }
    channels
}

/// Map configured channel names to channels, failing with every unknown name at once.
pub fn resolve_channels(names: &[String]) -> Result<Vec<Channel>> {
    let mut channels = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
        match Channel::parse(name) {
            Some(c) => channels.push(c),
            None => unknown.push(name.clone()),
        }
    }
    if !unknown.is_empty() {
        bail!("Unknown feature channels: {:?}", unknown);
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_parse() {
        let all: Vec<Channel> = (0..NUMERIC_COLUMNS.len())
            .map(Channel::Input)
            .chain(derived_channels())
            .collect();
        assert_eq!(all.len(), 28);
        for c in all {
            assert_eq!(Channel::parse(&c.name()), Some(c));
        }
    }

    #[test]
    fn one_minute_suffix_is_an_alias() {
        assert_eq!(
            Channel::parse("z_volume_1m"),
            Some(Channel::Frame(Timeframe::M1, TimeframeField::ZVolume))
        );
        assert_eq!(Channel::parse("z_volume_1m").unwrap().name(), "z_volume");
    }

    #[test]
    fn unknown_channels_are_listed() {
        let names = vec!["close".to_string(), "rsi".to_string(), "z_return_4h".to_string()];
        let err = resolve_channels(&names).unwrap_err().to_string();
        assert!(err.contains("rsi") && err.contains("z_return_4h"));
    }
}
