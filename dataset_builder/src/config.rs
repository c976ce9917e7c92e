use anyhow::{Result, bail};
use serde::Deserialize;

use data_ingestion::IoConfig;
use feature_processing::labeler::LabelConfig;
use feature_processing::misc::{Channel, resolve_channels};
use feature_processing::processor::FeatureConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceConfig {
    /// Window length L in base-cadence rows.
    pub length: usize,
    /// Channel order F of every window.
    pub channels: Vec<String>,
    pub standardize: bool,
}

impl SequenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            bail!("sequence.length must be at least 1");
        }
        if self.channels.is_empty() {
            bail!("sequence.channels is empty");
        }
        let channels = resolve_channels(&self.channels)?;
        for (i, c) in channels.iter().enumerate() {
            if channels[..i].contains(c) {
                bail!("sequence.channels lists {} twice", c.name());
            }
        }
        Ok(())
    }

    pub fn resolve(&self) -> Result<Vec<Channel>> {
        resolve_channels(&self.channels)
    }
}

/// Chronological train/val/test fractions.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SplitConfig {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !(0.0..=1.0).contains(&v) {
                bail!("split.{} must be within [0, 1], got {}", name, v);
            }
        }
        if self.train == 0.0 {
            bail!("split.train must be positive");
        }
        let total = self.train + self.val + self.test;
        if (total - 1.0).abs() > 1e-6 {
            bail!("split fractions must sum to 1, got {}", total);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    /// Output multiple of the pump class; 1 disables augmentation.
    pub pump_factor: usize,
    pub dump_factor: usize,
    /// Normals kept per minority window after oversampling.
    pub undersample_ratio: usize,
    pub noise_std: f64,
    pub scale_min: f64,
    pub scale_max: f64,
    pub warp_knots: usize,
    pub warp_std: f64,
}

impl RebalanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pump_factor == 0 || self.dump_factor == 0 {
            bail!("rebalance factors must be at least 1");
        }
        if self.undersample_ratio == 0 {
            bail!("rebalance.undersample_ratio must be at least 1");
        }
        if !(self.noise_std.is_finite() && self.noise_std >= 0.0) {
            bail!("rebalance.noise_std must be a non-negative number");
        }
        if !(self.warp_std.is_finite() && self.warp_std >= 0.0) {
            bail!("rebalance.warp_std must be a non-negative number");
        }
        if !(self.scale_min.is_finite() && self.scale_max.is_finite()) || self.scale_min > self.scale_max {
            bail!(
                "rebalance.scale_min {} must not exceed scale_max {}",
                self.scale_min,
                self.scale_max
            );
        }
        if self.warp_knots < 2 {
            bail!("rebalance.warp_knots must be at least 2");
        }
        Ok(())
    }
}

/// Per-window summary table for the tree model.
#[derive(Debug, Clone, Deserialize)]
pub struct FlattenConfig {
    pub enabled: bool,
    pub recent_steps: usize,
    pub summary_columns: Vec<String>,
}

impl FlattenConfig {
    pub fn validate(&self, sequence: &SequenceConfig) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.recent_steps == 0 || self.recent_steps >= sequence.length {
            bail!(
                "flatten.recent_steps must be within 1..{}, got {}",
                sequence.length,
                self.recent_steps
            );
        }
        let missing: Vec<&String> = self
            .summary_columns
            .iter()
            .filter(|c| !sequence.channels.contains(*c))
            .collect();
        if !missing.is_empty() {
            bail!("flatten.summary_columns are not sequence channels: {:?}", missing);
        }
        Ok(())
    }
}

/// Every section of the pipeline file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub seed: u64,
    pub io: IoConfig,
    pub features: FeatureConfig,
    pub labels: LabelConfig,
    pub sequence: SequenceConfig,
    pub split: SplitConfig,
    pub rebalance: RebalanceConfig,
    pub flatten: FlattenConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.io.validate()?;
        self.features.validate()?;
        self.labels.validate()?;
        self.sequence.validate()?;
        self.split.validate()?;
        self.rebalance.validate()?;
        self.flatten.validate(&self.sequence)
    }
}
