use std::collections::BTreeMap;

use anyhow::{Result, bail};
use ndarray::{Array2, Array3, Axis, Slice, s};
use serde::{Deserialize, Serialize};

use feature_processing::labeler::{Label, LabeledRow};
use feature_processing::misc::Channel;

/// Windowed samples: `x` is `(windows, length, channels)`, `y` holds class indices 0/1/2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSet {
    pub x: Array3<f64>,
    pub y: Vec<u8>,
}

impl SequenceSet {
    pub fn empty(length: usize, channels: usize) -> Self {
        Self {
            x: Array3::zeros((0, length, channels)),
            y: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Moves windows `[at, len)` into a new set. `self` keeps `[0, at)` in its own buffer.
    pub fn split_off(&mut self, at: usize) -> SequenceSet {
        let tail = SequenceSet {
            x: self.x.slice(s![at.., .., ..]).to_owned(),
            y: self.y.split_off(at),
        };
        self.x.slice_axis_inplace(Axis(0), Slice::from(0..at));
        tail
    }

    pub fn indices_of(&self, label: Label) -> Vec<usize> {
        let class = label.class_index();
        self.y
            .iter()
            .enumerate()
            .filter(|(_, y)| **y == class)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, label: Label) -> usize {
        let class = label.class_index();
        self.y.iter().filter(|y| **y == class).count()
    }

    /// Window count per label name, e.g. `{"dump": 3, "normal": 90, "pump": 7}`.
    pub fn distribution(&self) -> BTreeMap<String, usize> {
        Label::ALL
            .iter()
            .map(|l| (label_name(*l).to_string(), self.count(*l)))
            .collect()
    }
}

pub fn label_name(label: Label) -> &'static str {
    match label {
        Label::Dump => "dump",
        Label::Normal => "normal",
        Label::Pump => "pump",
    }
}

/// Feature matrix `(rows, channels)` in the configured channel order.
pub fn feature_matrix(rows: &[LabeledRow], channels: &[Channel]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), channels.len()), |(i, j)| {
        channels[j].value(&rows[i].features)
    })
}

/// Every contiguous window of `length` rows; window `i` covers rows `i..i + length`
/// and carries the label of row `i + length - 1`.
pub fn build_sequences(matrix: &Array2<f64>, labels: &[Label], length: usize) -> Result<SequenceSet> {
    if length == 0 {
        bail!("sequence length must be at least 1");
    }
    if matrix.nrows() != labels.len() {
        bail!(
            "feature matrix has {} rows but {} labels were given",
            matrix.nrows(),
            labels.len()
        );
    }

    let n_rows = matrix.nrows();
    let n_channels = matrix.ncols();
    if n_rows < length {
        return Ok(SequenceSet::empty(length, n_channels));
    }

    let n_windows = n_rows - length + 1;
    let mut x = Array3::zeros((n_windows, length, n_channels));
    for (i, mut window) in x.axis_iter_mut(Axis(0)).enumerate() {
        window.assign(&matrix.slice(s![i..i + length, ..]));
    }
    let y = labels[length - 1..].iter().map(|l| l.class_index()).collect();

    Ok(SequenceSet { x, y })
}
