use anyhow::{Result, bail};
use ndarray::{ArrayView1, ArrayView2, Axis, s};
use polars::prelude::*;

use crate::config::FlattenConfig;
use crate::sequence::SequenceSet;

fn mean(v: ArrayView1<f64>) -> f64 {
    v.mean().unwrap_or(0.0)
}

fn max(v: ArrayView1<f64>) -> f64 {
    v.fold(f64::NEG_INFINITY, |m, x| m.max(*x))
}

fn min(v: ArrayView1<f64>) -> f64 {
    v.fold(f64::INFINITY, |m, x| m.min(*x))
}

fn std(v: ArrayView1<f64>) -> f64 {
    v.std(0.0)
}

fn per_window(view: &ArrayView2<f64>, f: fn(ArrayView1<f64>) -> f64) -> Vec<f64> {
    view.axis_iter(Axis(0)).map(f).collect()
}

/// One row per window: the last timestep of every channel, window-wide and recent-tail
/// statistics of the summary columns, and the class index as `label`.
pub fn flatten_sequences(set: &SequenceSet, channel_names: &[String], config: &FlattenConfig) -> Result<DataFrame> {
    let (n, length, channels) = set.x.dim();
    if channel_names.len() != channels {
        bail!("{} channel names for {} channels", channel_names.len(), channels);
    }
    let recent = config.recent_steps.min(length);

    let mut columns = Vec::new();
    for (c, name) in channel_names.iter().enumerate() {
        let last: Vec<f64> = if length == 0 {
            vec![0.0; n]
        } else {
            set.x.slice(s![.., length - 1, c]).to_vec()
        };
        columns.push(Series::new(&format!("{name}_last"), last));
    }

    for name in &config.summary_columns {
        let Some(c) = channel_names.iter().position(|n| n == name) else {
            bail!("summary column {} is not a sequence channel", name);
        };
        let full = set.x.slice(s![.., .., c]);
        let tail = set.x.slice(s![.., length - recent.., c]);

        columns.push(Series::new(&format!("{name}_mean_{length}"), per_window(&full, mean)));
        columns.push(Series::new(&format!("{name}_std_{length}"), per_window(&full, std)));
        columns.push(Series::new(&format!("{name}_max_{length}"), per_window(&full, max)));
        columns.push(Series::new(&format!("{name}_min_{length}"), per_window(&full, min)));
        columns.push(Series::new(&format!("{name}_mean_{recent}"), per_window(&tail, mean)));
        columns.push(Series::new(&format!("{name}_max_{recent}"), per_window(&tail, max)));
    }

    columns.push(Series::new(
        "label",
        set.y.iter().map(|y| *y as u32).collect::<Vec<u32>>(),
    ));

    let df = DataFrame::new(columns)?;
    Ok(df)
}
