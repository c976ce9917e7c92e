use std::path::Path;

use anyhow::{Result, bail};
use log::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use data_ingestion::MarketRow;
use data_ingestion::loader::load_market_rows;
use feature_processing::export::{write_frame, write_labeled_table};
use feature_processing::label_market_rows;
use feature_processing::labeler::Label;
use feature_processing::misc::Channel;

use crate::config::PipelineConfig;
use crate::flatten::flatten_sequences;
use crate::metadata::{Metadata, PartitionSummary};
use crate::rebalance::Rebalancer;
use crate::scaler::{standardize, training_rows};
use crate::sequence::{build_sequences, feature_matrix};
use crate::split::{SplitBounds, split_chronological};
use crate::writer::ArtifactWriter;

/// Raw table to model-ready artifacts in one pass.
pub struct Pipeline {
    config: PipelineConfig,
    channels: Vec<Channel>,
    rebalancer: Rebalancer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let channels = config.sequence.resolve()?;
        let rebalancer = Rebalancer::new(config.rebalance.clone())?;
        Ok(Self {
            config,
            channels,
            rebalancer,
        })
    }

    pub fn run(&self) -> Result<Metadata> {
        let rows = load_market_rows(&self.config.io)?;
        self.build(&rows)
    }

    /// Everything after ingestion, over cleaned 1-minute rows.
    pub fn build(&self, rows: &[MarketRow]) -> Result<Metadata> {
        let cfg = &self.config;
        let length = cfg.sequence.length;

        let labeled = label_market_rows(rows, &cfg.features, &cfg.labels)?;
        write_labeled_table(&labeled, Path::new(&cfg.io.labeled_table_path))?;

        if labeled.len() < length {
            bail!(
                "{} labeled rows cannot fill a single {}-row window",
                labeled.len(),
                length
            );
        }
        let n_windows = labeled.len() - length + 1;
        let bounds = SplitBounds::new(n_windows, &cfg.split);
        if bounds.train_len() == 0 {
            bail!("{} windows leave no training windows", n_windows);
        }

        let mut matrix = feature_matrix(&labeled, &self.channels);
        let mut scaler = None;
        if cfg.sequence.standardize {
            let fit_rows = training_rows(labeled.len(), bounds.train_len(), length);
            let (scaled, fitted) = standardize(&matrix, fit_rows)?;
            info!("Standardised {} channels on the first {} rows", self.channels.len(), fit_rows);
            matrix = scaled;
            scaler = Some(fitted);
        }

        let labels: Vec<Label> = labeled.iter().map(|r| r.label).collect();
        let sequences = build_sequences(&matrix, &labels, length)?;
        drop(matrix);
        let all_shape = sequences.x.dim();
        info!("Built {} windows of shape ({}, {})", sequences.len(), length, self.channels.len());

        let parts = split_chronological(sequences, bounds);
        info!(
            "Split windows chronologically: train {}, val {}, test {}",
            parts.train.len(),
            parts.val.len(),
            parts.test.len()
        );

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let balanced = self.rebalancer.rebalance(&parts.train, &mut rng)?;

        let writer = ArtifactWriter::new(&cfg.io.output_dir)?;
        writer.write_partition("train", &balanced)?;
        writer.write_partition("train_orig", &parts.train)?;
        writer.write_partition("val", &parts.val)?;
        writer.write_partition("test", &parts.test)?;

        if cfg.flatten.enabled {
            let names: Vec<String> = self.channels.iter().map(|c| c.name()).collect();
            let mut flatten = cfg.flatten.clone();
            flatten.summary_columns = flatten
                .summary_columns
                .iter()
                .map(|c| Channel::parse(c).map_or_else(|| c.clone(), |c| c.name()))
                .collect();
            for (split, set) in [("train", &balanced), ("val", &parts.val), ("test", &parts.test)] {
                let mut df = flatten_sequences(set, &names, &flatten)?;
                write_frame(&mut df, &writer.path(&format!("{split}_flat.parquet")))?;
            }
        }

        let metadata = Metadata::new(
            cfg.seed,
            &self.channels,
            &PartitionSummary {
                all_shape,
                train: &balanced,
                train_original: &parts.train,
                val: &parts.val,
                test: &parts.test,
            },
            scaler,
        );
        writer.write_metadata(&metadata)?;
        Ok(metadata)
    }
}
