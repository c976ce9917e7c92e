use anyhow::{Result, bail};
use log::info;
use serde::{Deserialize, Serialize};

use crate::misc::FeatureRow;
use crate::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Pump,
    Dump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ZReturn,
    ZVolume,
    ClosePosition,
    /// z-score of the bid/ask ratio, base cadence only.
    OrderBook,
    /// External sentiment score, base cadence only.
    Sentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Gt,
    Lt,
}

/// One row of the declarative rule table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub metric: Metric,
    pub comparator: Comparator,
    pub threshold: f64,
    /// The direction can only be assigned when every mandatory rule holds.
    pub mandatory: bool,
}

impl Rule {
    const fn new(
        direction: Direction,
        timeframe: Timeframe,
        metric: Metric,
        comparator: Comparator,
        threshold: f64,
        mandatory: bool,
    ) -> Self {
        Self {
            direction,
            timeframe,
            metric,
            comparator,
            threshold,
            mandatory,
        }
    }

    pub fn observe(&self, row: &FeatureRow) -> f64 {
        let frame = row.frame(self.timeframe);
        match self.metric {
            Metric::ZReturn => frame.z_return,
            Metric::ZVolume => frame.z_volume,
            Metric::ClosePosition => frame.close_position,
            Metric::OrderBook => row.z_bid_ask_ratio,
            Metric::Sentiment => row.market.final_sentiment_score,
        }
    }

    pub fn holds(&self, row: &FeatureRow) -> bool {
        let value = self.observe(row);
        match self.comparator {
            Comparator::Gt => value > self.threshold,
            Comparator::Lt => value < self.threshold,
        }
    }
}

use Comparator::{Gt, Lt};
use Direction::{Dump, Pump};
use Metric::{ClosePosition, OrderBook, Sentiment, ZReturn, ZVolume};
use Timeframe::{M1, M5, M15};

// Dump volume rules use the same positive thresholds as pump: volume confirms both directions.
const STANDARD_RULES: [Rule; 16] = [
    Rule::new(Pump, M1, ZReturn, Gt, 2.5, true),
    Rule::new(Pump, M1, ZVolume, Gt, 2.5, true),
    Rule::new(Pump, M1, ClosePosition, Gt, 0.7, false),
    Rule::new(Pump, M5, ZReturn, Gt, 1.5, false),
    Rule::new(Pump, M5, ZVolume, Gt, 1.5, false),
    Rule::new(Pump, M15, ZReturn, Gt, 1.0, false),
    Rule::new(Pump, M1, OrderBook, Gt, 1.5, false),
    Rule::new(Pump, M1, Sentiment, Gt, 0.4, false),
    Rule::new(Dump, M1, ZReturn, Lt, -2.5, true),
    Rule::new(Dump, M1, ZVolume, Gt, 2.5, true),
    Rule::new(Dump, M1, ClosePosition, Lt, 0.3, false),
    Rule::new(Dump, M5, ZReturn, Lt, -1.5, false),
    Rule::new(Dump, M5, ZVolume, Gt, 1.5, false),
    Rule::new(Dump, M15, ZReturn, Lt, -1.0, false),
    Rule::new(Dump, M1, OrderBook, Lt, -1.5, false),
    Rule::new(Dump, M1, Sentiment, Lt, -0.4, false),
];

#[derive(Debug, Clone, Deserialize)]
pub struct LabelConfig {
    /// Minimum number of holding rules for a direction to be assigned.
    pub min_score: usize,
    /// Rows ahead used for the future-return veto.
    pub veto_horizon: usize,
    pub rules: Vec<Rule>,
}

impl LabelConfig {
    /// The production rule set: eight scored conditions per direction.
    pub fn standard() -> Self {
        Self {
            min_score: 4,
            veto_horizon: 5,
            rules: STANDARD_RULES.to_vec(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.veto_horizon == 0 {
            bail!("labels.veto_horizon must be at least 1");
        }
        for direction in [Direction::Pump, Direction::Dump] {
            let count = self.rules.iter().filter(|r| r.direction == direction).count();
            if count == 0 {
                bail!("labels.rules has no {:?} rules", direction);
            }
            if self.min_score > count {
                bail!(
                    "labels.min_score {} exceeds the {} {:?} rules",
                    self.min_score,
                    count,
                    direction
                );
            }
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| matches!(r.metric, Metric::OrderBook | Metric::Sentiment) && r.timeframe != Timeframe::M1)
        {
            bail!("labels.rules: {:?} is only available on the 1m timeframe", rule.metric);
        }
        if self.rules.iter().any(|r| !r.threshold.is_finite()) {
            bail!("labels.rules thresholds must be finite");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Dump,
    Normal,
    Pump,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::Dump, Label::Normal, Label::Pump];

    /// -1 / 0 / 1 as written to the labeled table.
    pub fn raw(self) -> i8 {
        match self {
            Label::Dump => -1,
            Label::Normal => 0,
            Label::Pump => 1,
        }
    }

    /// 0 / 1 / 2 as consumed by the models.
    pub fn class_index(self) -> u8 {
        match self {
            Label::Dump => 0,
            Label::Normal => 1,
            Label::Pump => 2,
        }
    }

    pub fn from_raw(raw: i8) -> Option<Label> {
        Label::ALL.into_iter().find(|l| l.raw() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledRow {
    pub features: FeatureRow,
    pub pump_score: usize,
    pub dump_score: usize,
    pub future_return: Option<f64>,
    pub label: Label,
}

/// `close[t + horizon] / close[t] - 1`; `None` past the end or when `close[t]` is zero.
pub fn future_returns(closes: &[f64], horizon: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|t| {
            let ahead = closes.get(t + horizon)?;
            let now = closes[t];
            (now != 0.0).then(|| ahead / now - 1.0)
        })
        .collect()
}

/// Demote a pump that falls, or a dump that rises, over the horizon.
pub fn apply_veto(label: Label, future_return: Option<f64>) -> Label {
    match (label, future_return) {
        (Label::Pump, Some(r)) if r < 0.0 => Label::Normal,
        (Label::Dump, Some(r)) if r > 0.0 => Label::Normal,
        _ => label,
    }
}

pub struct LabelEngine {
    config: LabelConfig,
}

impl LabelEngine {
    pub fn new(config: LabelConfig) -> Self {
        Self { config }
    }

    fn rules(&self, direction: Direction) -> impl Iterator<Item = &Rule> {
        self.config.rules.iter().filter(move |r| r.direction == direction)
    }

    pub fn score(&self, row: &FeatureRow, direction: Direction) -> usize {
        self.rules(direction).filter(|r| r.holds(row)).count()
    }

    fn mandatory_hold(&self, row: &FeatureRow, direction: Direction) -> bool {
        self.rules(direction).filter(|r| r.mandatory).all(|r| r.holds(row))
    }

    /// Rule-based label and the two scores, before the veto. Pump wins ties.
    pub fn classify(&self, row: &FeatureRow) -> (Label, usize, usize) {
        let pump_score = self.score(row, Direction::Pump);
        let dump_score = self.score(row, Direction::Dump);
        let min = self.config.min_score;

        let label = if pump_score >= min && self.mandatory_hold(row, Direction::Pump) {
            Label::Pump
        } else if dump_score >= min && pump_score < min && self.mandatory_hold(row, Direction::Dump) {
            Label::Dump
        } else {
            Label::Normal
        };
        (label, pump_score, dump_score)
    }

    pub fn label(&self, table: &[FeatureRow]) -> Vec<LabeledRow> {
        let closes: Vec<f64> = table.iter().map(|r| r.market.close).collect();
        let futures = future_returns(&closes, self.config.veto_horizon);

        let mut vetoed = 0usize;
        let labeled: Vec<LabeledRow> = table
            .iter()
            .zip(futures)
            .map(|(row, future_return)| {
                let (rule_label, pump_score, dump_score) = self.classify(row);
                let label = apply_veto(rule_label, future_return);
                if label != rule_label {
                    vetoed += 1;
                }
                LabeledRow {
                    features: *row,
                    pump_score,
                    dump_score,
                    future_return,
                    label,
                }
            })
            .collect();

        let count = |l: Label| labeled.iter().filter(|r| r.label == l).count();
        info!(
            "Labels: pump {}, dump {}, normal {} ({} demoted by the {}-row veto)",
            count(Label::Pump),
            count(Label::Dump),
            count(Label::Normal),
            vetoed,
            self.config.veto_horizon
        );
        labeled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misc::TimeframeValues;
    use data_ingestion::MarketRow;

    fn neutral_row() -> FeatureRow {
        FeatureRow {
            market: MarketRow { close: 100.0, ..Default::default() },
            frames: [TimeframeValues::NEUTRAL; 3],
            z_bid_ask_ratio: 0.0,
            z_spread: 0.0,
            z_top_bid: 0.0,
            order_imbalance: 0.0,
            spread_pct: 0.0,
            volume_imbalance: 0.0,
        }
    }

    fn pump_row() -> FeatureRow {
        let mut row = neutral_row();
        row.frames[0].z_return = 3.0;
        row.frames[0].z_volume = 3.0;
        row.frames[0].close_position = 0.9;
        row.z_bid_ask_ratio = 2.0;
        row
    }

    fn dump_row() -> FeatureRow {
        let mut row = neutral_row();
        row.frames[0].z_return = -3.0;
        row.frames[0].z_volume = 3.0;
        row.frames[0].close_position = 0.1;
        row.market.final_sentiment_score = -0.9;
        row
    }

    #[test]
    fn standard_table_is_valid_and_balanced() {
        let cfg = LabelConfig::standard();
        cfg.validate().unwrap();
        let engine = LabelEngine::new(cfg);
        let row = neutral_row();
        assert_eq!(engine.rules(Direction::Pump).count(), 8);
        assert_eq!(engine.rules(Direction::Dump).count(), 8);
        assert_eq!(engine.classify(&row), (Label::Normal, 0, 0));
    }

    #[test]
    fn pump_needs_score_and_mandatory_conditions() {
        let engine = LabelEngine::new(LabelConfig::standard());
        assert_eq!(engine.classify(&pump_row()).0, Label::Pump);

        // four conditions but the 1m volume condition is missing
        let mut row = pump_row();
        row.frames[0].z_volume = 0.0;
        row.market.final_sentiment_score = 0.9;
        let (label, pump, _) = engine.classify(&row);
        assert_eq!(pump, 4);
        assert_eq!(label, Label::Normal);

        // both mandatory but only three conditions in total
        let mut row = pump_row();
        row.z_bid_ask_ratio = 0.0;
        assert_eq!(engine.classify(&row), (Label::Normal, 3, 1));
    }

    #[test]
    fn dump_uses_positive_volume_threshold() {
        let engine = LabelEngine::new(LabelConfig::standard());
        let (label, pump, dump) = engine.classify(&dump_row());
        assert_eq!(label, Label::Dump);
        assert_eq!(dump, 4);
        assert_eq!(pump, 1);

        let mut row = dump_row();
        row.frames[0].z_volume = -3.0;
        assert_eq!(engine.classify(&row).0, Label::Normal);
    }

    #[test]
    fn pump_wins_when_both_qualify() {
        let rules = vec![
            Rule::new(Pump, M1, ZVolume, Gt, 1.0, false),
            Rule::new(Dump, M1, ZVolume, Gt, 1.0, false),
        ];
        let engine = LabelEngine::new(LabelConfig { min_score: 1, veto_horizon: 1, rules });
        let mut row = neutral_row();
        row.frames[0].z_volume = 2.0;
        assert_eq!(engine.classify(&row), (Label::Pump, 1, 1));
    }

    #[test]
    fn veto_demotes_against_the_move() {
        assert_eq!(apply_veto(Label::Pump, Some(-0.01)), Label::Normal);
        assert_eq!(apply_veto(Label::Pump, Some(0.0)), Label::Pump);
        assert_eq!(apply_veto(Label::Dump, Some(0.01)), Label::Normal);
        assert_eq!(apply_veto(Label::Dump, Some(-0.01)), Label::Dump);
        assert_eq!(apply_veto(Label::Pump, None), Label::Pump);
        assert_eq!(apply_veto(Label::Normal, Some(-1.0)), Label::Normal);
    }

    #[test]
    fn future_returns_stop_at_horizon() {
        let closes = [100.0, 0.0, 102.0, 103.0, 99.0];
        let f = future_returns(&closes, 2);
        assert!((f[0].unwrap() - 0.02).abs() < 1e-12);
        assert_eq!(f[1], None);
        assert!(f[3].is_none() && f[4].is_none());
    }

    #[test]
    fn trailing_rows_keep_rule_label() {
        let engine = LabelEngine::new(LabelConfig::standard());
        let mut table = vec![neutral_row(); 8];
        table[7] = pump_row();
        table[7].market.close = 200.0;
        let labeled = engine.label(&table);
        assert_eq!(labeled[7].future_return, None);
        assert_eq!(labeled[7].label, Label::Pump);
    }

    #[test]
    fn post_veto_labels_agree_with_future_return() {
        let engine = LabelEngine::new(LabelConfig::standard());
        let mut table = Vec::new();
        for i in 0..30 {
            let mut row = if i % 3 == 0 { pump_row() } else if i % 3 == 1 { dump_row() } else { neutral_row() };
            row.market.close = 100.0 + ((i * 7) % 5) as f64 - 2.0;
            table.push(row);
        }
        for row in engine.label(&table) {
            match (row.label, row.future_return) {
                (Label::Pump, Some(r)) => assert!(r >= 0.0),
                (Label::Dump, Some(r)) => assert!(r <= 0.0),
                _ => {}
            }
        }
    }

    #[test]
    fn label_mappings() {
        for label in Label::ALL {
            assert_eq!(Label::from_raw(label.raw()), Some(label));
        }
        assert_eq!(Label::Dump.class_index(), 0);
        assert_eq!(Label::Pump.raw(), 1);
        assert_eq!(Label::from_raw(3), None);
    }

    #[test]
    fn rules_deserialize_from_table_rows() {
        let rule: Rule = serde_json::from_str(
            r#"{"direction":"dump","timeframe":"15m","metric":"z_return","comparator":"lt","threshold":-1.0,"mandatory":false}"#,
        )
        .unwrap();
        assert_eq!(rule, Rule::new(Dump, M15, ZReturn, Lt, -1.0, false));
    }

    #[test]
    fn sentiment_on_coarse_timeframe_is_rejected() {
        let mut cfg = LabelConfig::standard();
        cfg.rules[7].timeframe = Timeframe::M5;
        assert!(cfg.validate().is_err());
    }
}
