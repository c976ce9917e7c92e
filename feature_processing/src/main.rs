use std::path::Path;

use anyhow::{Context, Result};
use data_ingestion::config::{load_config, resolve_config_path};
use data_ingestion::loader::load_market_rows;
use data_ingestion::logger::init_logger;
use feature_processing::config::LabelingConfig;
use feature_processing::export::write_labeled_table;
use feature_processing::label_market_rows;
use log::*;

struct Pipeline {
    config: LabelingConfig,
}

impl Pipeline {
    fn new(config_path: &str) -> Result<Self> {
        let config: LabelingConfig = load_config(config_path)
            .with_context(|| format!("Cannot load configuration from {config_path}"))?;
        config.validate()?;
        Ok(Self { config })
    }

    fn run(&self) -> Result<()> {
        let rows = load_market_rows(&self.config.io)?;
        let labeled = label_market_rows(&rows, &self.config.features, &self.config.labels)?;
        write_labeled_table(&labeled, Path::new(&self.config.io.labeled_table_path))?;
        Ok(())
    }
}

fn main() -> Result<()> {
    init_logger();
    let config_path = resolve_config_path();
    info!("🚀Labeling pump/dump events using {}", config_path);

    let pipeline = Pipeline::new(&config_path)?;
    if let Err(e) = pipeline.run() {
        error!("Labeling failed: {:?}", e);
        return Err(e);
    }

    info!("Labeled table written✅");
    Ok(())
}
