pub mod align;
pub mod bars;
pub mod config;
pub mod export;
pub mod labeler;
pub mod misc;
pub mod processor;
pub mod rolling;
pub mod synthetic;
pub mod timeframe;

use anyhow::Result;
use data_ingestion::MarketRow;

use crate::labeler::{LabelConfig, LabelEngine, LabeledRow};
use crate::processor::{FeatureConfig, FeatureProcessor};

/// Feature table followed by the label engine, over cleaned 1-minute rows.
pub fn label_market_rows(
    rows: &[MarketRow],
    features: &FeatureConfig,
    labels: &LabelConfig,
) -> Result<Vec<LabeledRow>> {
    let table = FeatureProcessor::new(features.clone()).process(rows)?;
    Ok(LabelEngine::new(labels.clone()).label(&table))
}
