use anyhow::Result;
use serde::Deserialize;

use data_ingestion::IoConfig;

use crate::labeler::LabelConfig;
use crate::processor::FeatureConfig;

/// The sections of the pipeline file the labeling stage reads. Other sections are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelingConfig {
    pub io: IoConfig,
    pub features: FeatureConfig,
    pub labels: LabelConfig,
}

impl LabelingConfig {
    pub fn validate(&self) -> Result<()> {
        self.io.validate()?;
        self.features.validate()?;
        self.labels.validate()
    }
}
