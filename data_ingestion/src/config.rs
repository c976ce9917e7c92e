use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::DataIngestionError;

/// Environment overrides look like `PUMPDUMP__SPLIT__TRAIN=0.7`.
pub const ENV_PREFIX: &str = "PUMPDUMP";
pub const CONFIG_PATH_VAR: &str = "PIPELINE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "pipeline.toml";

/// Where the raw table comes from and where artifacts go.
#[derive(Debug, Clone, Deserialize)]
pub struct IoConfig {
    pub input_path: String,
    pub timestamp_column: String,
    pub labeled_table_path: String,
    pub output_dir: String,
}

impl IoConfig {
    pub fn validate(&self) -> Result<(), DataIngestionError> {
        if self.input_path.trim().is_empty() {
            return Err(DataIngestionError::InvalidConfig("io.input_path is empty".into()));
        }
        if self.timestamp_column.trim().is_empty() {
            return Err(DataIngestionError::InvalidConfig(
                "io.timestamp_column is empty".into(),
            ));
        }
        if self.labeled_table_path.trim().is_empty() {
            return Err(DataIngestionError::InvalidConfig(
                "io.labeled_table_path is empty".into(),
            ));
        }
        if self.output_dir.trim().is_empty() {
            return Err(DataIngestionError::InvalidConfig("io.output_dir is empty".into()));
        }
        Ok(())
    }
}

/// Load any config section tree from a TOML file, layered with `PUMPDUMP__*` env overrides.
pub fn load_config<T: DeserializeOwned>(path: &str) -> Result<T, ConfigError> {
    let cfg = Config::builder()
        .add_source(File::new(path, FileFormat::Toml))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

/// Same as [`load_config`] but from an in-memory TOML document, without env overrides.
pub fn parse_config<T: DeserializeOwned>(raw: &str) -> Result<T, ConfigError> {
    let cfg = Config::builder()
        .add_source(File::from_str(raw, FileFormat::Toml))
        .build()?;
    cfg.try_deserialize()
}

/// First CLI argument, then `PIPELINE_CONFIG` (a `.env` file is honoured), then `pipeline.toml`.
pub fn resolve_config_path() -> String {
    dotenvy::dotenv().ok();
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_VAR).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}
