use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use polars::prelude::*;

use data_ingestion::loader::NUMERIC_COLUMNS;

use crate::labeler::LabeledRow;
use crate::misc::derived_channels;

/// Labeled table as a DataFrame: timestamp, inputs, derived features, scores, future return, label.
pub fn labeled_frame(rows: &[LabeledRow]) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(NUMERIC_COLUMNS.len() + 24);
    columns.push(Series::new(
        "timestamp",
        rows.iter().map(|r| r.features.market.timestamp).collect::<Vec<i64>>(),
    ));

    for (i, name) in NUMERIC_COLUMNS.iter().enumerate() {
        let values: Vec<f64> = rows.iter().map(|r| r.features.market.values()[i]).collect();
        columns.push(Series::new(name, values));
    }

    for channel in derived_channels() {
        let values: Vec<f64> = rows.iter().map(|r| channel.value(&r.features)).collect();
        columns.push(Series::new(&channel.name(), values));
    }

    columns.push(Series::new(
        "pump_conditions",
        rows.iter().map(|r| r.pump_score as u32).collect::<Vec<u32>>(),
    ));
    columns.push(Series::new(
        "dump_conditions",
        rows.iter().map(|r| r.dump_score as u32).collect::<Vec<u32>>(),
    ));
    columns.push(Series::new(
        "future_return",
        rows.iter().map(|r| r.future_return).collect::<Vec<Option<f64>>>(),
    ));
    columns.push(Series::new(
        "label",
        rows.iter().map(|r| r.label.raw() as i32).collect::<Vec<i32>>(),
    ));

    let df = DataFrame::new(columns)?;
    Ok(df)
}

/// Write as CSV when the path ends in `.csv`, Parquet otherwise.
pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;

    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        CsvWriter::new(file).finish(df)?;
    } else {
        ParquetWriter::new(file).finish(df)?;
    }

    info!("Wrote {} rows x {} columns to {}", df.height(), df.width(), path.display());
    Ok(())
}

pub fn write_labeled_table(rows: &[LabeledRow], path: &Path) -> Result<()> {
    let mut df = labeled_frame(rows)?;
    write_frame(&mut df, path)
}
