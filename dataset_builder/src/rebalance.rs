use anyhow::{Context, Result};
use log::{info, warn};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use rand::distributions::Uniform;
use rand::seq::SliceRandom;
use rand::seq::index;
use rand_distr::{Distribution, Normal};

use feature_processing::labeler::Label;

use crate::config::RebalanceConfig;
use crate::sequence::{SequenceSet, label_name};

/// `knots` evenly spaced control values linearly interpolated over `length` steps.
pub fn warp_curve(controls: &[f64], length: usize) -> Vec<f64> {
    if controls.is_empty() {
        return vec![1.0; length];
    }
    if length <= 1 || controls.len() == 1 {
        return vec![controls[0]; length];
    }
    let last_knot = (controls.len() - 1) as f64;
    (0..length)
        .map(|t| {
            let pos = t as f64 * last_knot / (length - 1) as f64;
            let lo = (pos.floor() as usize).min(controls.len() - 2);
            let frac = pos - lo as f64;
            controls[lo] * (1.0 - frac) + controls[lo + 1] * frac
        })
        .collect()
}

/// Oversamples dump and pump training windows with perturbed copies, then undersamples normals.
pub struct Rebalancer {
    config: RebalanceConfig,
    noise: Normal<f64>,
    scale: Uniform<f64>,
    warp: Normal<f64>,
}

impl Rebalancer {
    pub fn new(config: RebalanceConfig) -> Result<Self> {
        let noise = Normal::new(0.0, config.noise_std).context("invalid rebalance.noise_std")?;
        let warp = Normal::new(1.0, config.warp_std).context("invalid rebalance.warp_std")?;
        let scale = Uniform::new_inclusive(config.scale_min, config.scale_max);
        Ok(Self {
            config,
            noise,
            scale,
            warp,
        })
    }

    fn factor(&self, label: Label) -> usize {
        match label {
            Label::Dump => self.config.dump_factor,
            Label::Pump => self.config.pump_factor,
            Label::Normal => 1,
        }
    }

    /// One perturbed copy: `((x + noise) * scale) * warp[t]`.
    pub fn augment<R: Rng + ?Sized>(&self, window: ArrayView2<f64>, rng: &mut R) -> Array2<f64> {
        let (length, channels) = window.dim();
        let noise = Array2::from_shape_simple_fn((length, channels), || self.noise.sample(rng));
        let scale = self.scale.sample(rng);
        let controls: Vec<f64> = (0..self.config.warp_knots).map(|_| self.warp.sample(rng)).collect();
        let curve = warp_curve(&controls, length);

        let mut out = (&window + &noise) * scale;
        for (mut step, w) in out.axis_iter_mut(Axis(0)).zip(curve) {
            step *= w;
        }
        out
    }

    /// Each `label` window once, plus `factor - 1` perturbed copies of it.
    fn oversample_class(&self, set: &SequenceSet, label: Label) -> Vec<Source> {
        let indices = set.indices_of(label);
        if indices.is_empty() {
            info!("No {} windows to oversample", label_name(label));
            return Vec::new();
        }
        let factor = self.factor(label);
        let mut plan: Vec<Source> = indices.iter().map(|&i| Source::Original(i)).collect();
        for _ in 1..factor {
            plan.extend(indices.iter().map(|&i| Source::Augmented(i)));
        }
        info!(
            "{}: {} windows -> {} (x{})",
            label_name(label),
            indices.len(),
            plan.len(),
            factor
        );
        plan
    }

    /// Training partition only. Originals are kept; the result is shuffled once.
    ///
    /// The output tensor is allocated once at its final size and filled window by window.
    pub fn rebalance<R: Rng + ?Sized>(&self, set: &SequenceSet, rng: &mut R) -> Result<SequenceSet> {
        info!("Train distribution before rebalancing: {:?}", set.distribution());

        let mut minority = self.oversample_class(set, Label::Dump);
        minority.extend(self.oversample_class(set, Label::Pump));

        let normal_idx = set.indices_of(Label::Normal);
        let mut plan: Vec<Source> = if minority.is_empty() {
            warn!("Training partition has no pump or dump windows, keeping every normal window");
            normal_idx.iter().map(|&i| Source::Original(i)).collect()
        } else {
            let target = normal_idx
                .len()
                .min(minority.len() * self.config.undersample_ratio);
            if target < normal_idx.len() {
                info!("Undersampling normal windows: {} -> {}", normal_idx.len(), target);
                index::sample(rng, normal_idx.len(), target)
                    .into_iter()
                    .map(|k| Source::Original(normal_idx[k]))
                    .collect()
            } else {
                normal_idx.iter().map(|&i| Source::Original(i)).collect()
            }
        };
        plan.extend(minority);
        plan.shuffle(rng);

        let (_, length, channels) = set.x.dim();
        let mut x = Array3::zeros((plan.len(), length, channels));
        let mut y = Vec::with_capacity(plan.len());
        for (mut slot, source) in x.axis_iter_mut(Axis(0)).zip(&plan) {
            let i = match *source {
                Source::Original(i) => {
                    slot.assign(&set.x.index_axis(Axis(0), i));
                    i
                }
                Source::Augmented(i) => {
                    slot.assign(&self.augment(set.x.index_axis(Axis(0), i), rng));
                    i
                }
            };
            y.push(set.y[i]);
        }

        let balanced = SequenceSet { x, y };
        info!("Train distribution after rebalancing: {:?}", balanced.distribution());
        Ok(balanced)
    }
}

/// Where one output window comes from: a training window as-is, or a perturbed copy of it.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Original(usize),
    Augmented(usize),
}
