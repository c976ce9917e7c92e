use crate::config::SplitConfig;
use crate::sequence::SequenceSet;

/// Window index boundaries `[0, train_end)`, `[train_end, val_end)`, `[val_end, n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitBounds {
    pub train_end: usize,
    pub val_end: usize,
    pub total: usize,
}

/// `floor(total * fraction)`, tolerant of fractions like 0.7 that are not exact in binary.
fn share(total: usize, fraction: f64) -> usize {
    (total as f64 * fraction + 1e-9).floor() as usize
}

impl SplitBounds {
    pub fn new(total: usize, split: &SplitConfig) -> Self {
        let train_end = share(total, split.train).min(total);
        let val_end = (train_end + share(total, split.val)).min(total);
        Self {
            train_end,
            val_end,
            total,
        }
    }

    pub fn train_len(&self) -> usize {
        self.train_end
    }

    pub fn val_len(&self) -> usize {
        self.val_end - self.train_end
    }

    pub fn test_len(&self) -> usize {
        self.total - self.val_end
    }
}

pub struct Partitions {
    pub train: SequenceSet,
    pub val: SequenceSet,
    pub test: SequenceSet,
}

/// Contiguous chronological split; windows are never reordered across a boundary.
/// The training partition keeps the input's buffer, only val and test are copied out.
pub fn split_chronological(mut set: SequenceSet, bounds: SplitBounds) -> Partitions {
    let test = set.split_off(bounds.val_end);
    let val = set.split_off(bounds.train_end);
    Partitions { train: set, val, test }
}
