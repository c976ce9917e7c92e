use anyhow::{Context, Result};
use data_ingestion::config::{load_config, resolve_config_path};
use data_ingestion::logger::init_logger;
use dataset_builder::{Pipeline, PipelineConfig};
use log::*;

fn main() -> Result<()> {
    init_logger();
    let config_path = resolve_config_path();
    info!("🚀Building pump/dump dataset using {}", config_path);

    let config: PipelineConfig = load_config(&config_path)
        .with_context(|| format!("Cannot load configuration from {config_path}"))?;
    let output_dir = config.io.output_dir.clone();
    let pipeline = Pipeline::new(config)?;

    match pipeline.run() {
        Ok(metadata) => {
            info!(
                "Dataset written to {}: train {:?}, val {:?}, test {:?}✅",
                output_dir,
                metadata.shapes.get("train"),
                metadata.shapes.get("val"),
                metadata.shapes.get("test")
            );
            Ok(())
        }
        Err(e) => {
            error!("Dataset build failed: {:?}", e);
            Err(e)
        }
    }
}
