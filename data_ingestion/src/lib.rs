pub mod config;
pub mod error;
pub mod loader;
pub mod logger;

pub use config::IoConfig;
pub use error::DataIngestionError;
pub use loader::{MarketRow, MINUTE_MS};
