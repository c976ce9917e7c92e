use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use feature_processing::labeler::Label;
use feature_processing::misc::Channel;

use crate::scaler::StandardScaler;
use crate::sequence::SequenceSet;

/// Inverse-frequency "balanced" weights `n / (k * n_c)` over the k classes present.
pub fn balanced_class_weights(y: &[u8]) -> BTreeMap<u8, f64> {
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for class in y {
        *counts.entry(*class).or_default() += 1;
    }
    let n = y.len() as f64;
    let k = counts.len() as f64;
    counts
        .into_iter()
        .map(|(class, count)| (class, n / (k * count as f64)))
        .collect()
}

/// `"-1" -> 0`, `"0" -> 1`, `"1" -> 2`.
pub fn label_mapping() -> BTreeMap<String, u8> {
    Label::ALL
        .iter()
        .map(|l| (l.raw().to_string(), l.class_index()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub seed: u64,
    pub sequence_length: usize,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub base_features: Vec<String>,
    pub computed_features: Vec<String>,
    pub label_mapping: BTreeMap<String, u8>,
    pub class_weights: BTreeMap<String, BTreeMap<u8, f64>>,
    pub class_distribution: BTreeMap<String, BTreeMap<String, usize>>,
    pub shapes: BTreeMap<String, [usize; 3]>,
    pub scaler: Option<StandardScaler>,
}

/// The partitions a metadata record describes.
pub struct PartitionSummary<'a> {
    /// `(windows, length, channels)` of the full windowed tensor before splitting.
    pub all_shape: (usize, usize, usize),
    pub train: &'a SequenceSet,
    pub train_original: &'a SequenceSet,
    pub val: &'a SequenceSet,
    pub test: &'a SequenceSet,
}

impl Metadata {
    pub fn new(
        seed: u64,
        channels: &[Channel],
        parts: &PartitionSummary,
        scaler: Option<StandardScaler>,
    ) -> Self {
        let names = |pick: fn(&Channel) -> bool| -> Vec<String> {
            channels.iter().filter(|c| pick(*c)).map(|c| c.name()).collect()
        };
        let named = [
            ("train", parts.train),
            ("train_original", parts.train_original),
            ("val", parts.val),
            ("test", parts.test),
        ];

        let mut shapes: BTreeMap<String, [usize; 3]> = named
            .iter()
            .map(|(name, set)| {
                let (n, l, f) = set.x.dim();
                (name.to_string(), [n, l, f])
            })
            .collect();
        let (n, l, f) = parts.all_shape;
        shapes.insert("all".to_string(), [n, l, f]);

        Self {
            seed,
            sequence_length: l,
            n_features: channels.len(),
            feature_names: channels.iter().map(|c| c.name()).collect(),
            base_features: names(|c| c.is_input()),
            computed_features: names(|c| !c.is_input()),
            label_mapping: label_mapping(),
            class_weights: [("train", parts.train), ("val", parts.val), ("test", parts.test)]
                .iter()
                .map(|(name, set)| (name.to_string(), balanced_class_weights(&set.y)))
                .collect(),
            class_distribution: named
                .iter()
                .map(|(name, set)| (name.to_string(), set.distribution()))
                .collect(),
            shapes,
            scaler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn balanced_weights_match_inverse_frequency() {
        let y = [1, 1, 1, 1, 1, 1, 0, 2, 2, 1];
        let w = balanced_class_weights(&y);
        assert!((w[&1] - 10.0 / (3.0 * 7.0)).abs() < 1e-12);
        assert!((w[&0] - 10.0 / 3.0).abs() < 1e-12);
        assert!((w[&2] - 10.0 / 6.0).abs() < 1e-12);
        assert!(balanced_class_weights(&[]).is_empty());
        assert_eq!(balanced_class_weights(&[1, 1]), BTreeMap::from([(1, 1.0)]));
    }

    #[test]
    fn record_lists_names_shapes_and_mapping() {
        let channels = vec![
            Channel::parse("close").unwrap(),
            Channel::parse("z_return_5m").unwrap(),
        ];
        let set = |n: usize, y: u8| SequenceSet {
            x: Array3::zeros((n, 3, 2)),
            y: vec![y; n],
        };
        let train = set(12, 2);
        let orig = set(8, 1);
        let val = set(1, 1);
        let test = set(1, 0);
        let meta = Metadata::new(
            42,
            &channels,
            &PartitionSummary {
                all_shape: (10, 3, 2),
                train: &train,
                train_original: &orig,
                val: &val,
                test: &test,
            },
            None,
        );

        assert_eq!(meta.feature_names, vec!["close", "z_return_5m"]);
        assert_eq!(meta.base_features, vec!["close"]);
        assert_eq!(meta.computed_features, vec!["z_return_5m"]);
        assert_eq!(meta.shapes["train"], [12, 3, 2]);
        assert_eq!(meta.shapes["all"], [10, 3, 2]);
        assert_eq!(meta.label_mapping["-1"], 0);
        assert_eq!(meta.class_distribution["train_original"]["normal"], 8);
        assert_eq!(meta.class_weights["test"][&0], 1.0);

        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
