use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Axis, s};
use serde::{Deserialize, Serialize};

/// Per-channel standardisation. Std uses the population formula; a zero std scales by 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &Array2<f64>) -> Result<Self> {
        let Some(mean) = rows.mean_axis(Axis(0)) else {
            bail!("cannot fit a scaler on zero rows");
        };
        let std = rows.std_axis(Axis(0), 0.0);
        let scale = std
            .iter()
            .map(|s| if *s > 0.0 && s.is_finite() { *s } else { 1.0 })
            .collect();
        Ok(Self {
            mean: mean.to_vec(),
            scale,
        })
    }

    pub fn transform(&self, rows: &Array2<f64>) -> Array2<f64> {
        let mean = Array1::from_vec(self.mean.clone());
        let scale = Array1::from_vec(self.scale.clone());
        (rows - &mean) / &scale
    }
}

/// Rows that feed training windows: the first `train_windows + length - 1`.
pub fn training_rows(n_rows: usize, train_windows: usize, length: usize) -> usize {
    if train_windows == 0 {
        0
    } else {
        (train_windows + length - 1).min(n_rows)
    }
}

/// Fit on the training prefix of `matrix` and apply to all of it.
pub fn standardize(matrix: &Array2<f64>, train_rows: usize) -> Result<(Array2<f64>, StandardScaler)> {
    let scaler = StandardScaler::fit(&matrix.slice(s![..train_rows, ..]).to_owned())?;
    let scaled = scaler.transform(matrix);
    Ok((scaled, scaler))
}
