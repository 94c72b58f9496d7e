//! Preprocessing fitted on the training split: NaN imputation, then standard scaling
//! through `linfa-preprocessing`. Both are exported as serving [`Transform`] steps.

use linfa::prelude::*;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2, Axis};

use crate::error::DatasetError;
use crate::pipeline::{ImputeStrategy, Transform};

pub fn to_matrix(rows: &[Vec<f64>], n_features: usize) -> Result<Array2<f64>, DatasetError> {
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((rows.len(), n_features), flat).map_err(|e| DatasetError::Fit(e.to_string()))
}

/// Per-column statistic over the non-NaN values; all-missing columns fall back to 0.
pub fn fit_imputer(x: &Array2<f64>, strategy: ImputeStrategy) -> Vec<f64> {
    x.axis_iter(Axis(1)).map(|col| {
        let mut present: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() { return 0.0; }
        match strategy {
            ImputeStrategy::Mean => present.iter().sum::<f64>() / present.len() as f64,
            ImputeStrategy::Median => {
                present.sort_by(f64::total_cmp);
                let mid = present.len() / 2;
                if present.len() % 2 == 0 { (present[mid - 1] + present[mid]) / 2.0 } else { present[mid] }
            }
        }
    }).collect()
}

pub fn impute(x: &mut Array2<f64>, statistics: &[f64]) {
    for (mut col, fill) in x.axis_iter_mut(Axis(1)).zip(statistics) {
        col.mapv_inplace(|v| if v.is_nan() { *fill } else { v });
    }
}

/// Fits the imputer and applies it in place.
pub fn fit_impute(x: &mut Array2<f64>, strategy: ImputeStrategy) -> Transform {
    let statistics = fit_imputer(x, strategy);
    impute(x, &statistics);
    Transform::SimpleImputer { strategy, statistics }
}

/// Population standardization; zero-variance columns keep a unit scale. Returns the serving
/// step and the scaled matrix, or `Overflow` when a column cannot be represented.
pub fn fit_scaler(x: Array2<f64>, y: &Array1<usize>, features: &[String]) -> Result<(Transform, Array2<f64>), DatasetError> {
    let ds = Dataset::new(x, y.clone());
    let scaler = LinearScaler::standard().fit(&ds).map_err(|e| DatasetError::Fit(e.to_string()))?;
    let mean = scaler.offsets().to_vec();
    // linfa multiplies by its scales; the serving step divides
    let scale: Vec<f64> = scaler.scales().iter().map(|k| 1.0 / k).collect();
    let scaled = scaler.transform(ds).records().clone();

    let column = |c: usize| features.get(c).cloned().unwrap_or_else(|| c.to_string());
    if let Some(c) = (0..mean.len()).find(|&c| !mean[c].is_finite() || !scale[c].is_finite() || scale[c] == 0.0) {
        return Err(DatasetError::Overflow(format!("column '{}' has no finite mean and spread", column(c))));
    }
    if let Some(((_, c), _)) = scaled.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(DatasetError::Overflow(format!("column '{}' is not finite after scaling", column(c))));
    }
    Ok((Transform::StandardScaler { mean, scale }, scaled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn medians_skip_nan() {
        let x = array![[1.0, f64::NAN], [3.0, f64::NAN], [10.0, f64::NAN], [4.0, f64::NAN]];
        assert_eq!(fit_imputer(&x, ImputeStrategy::Median), vec![3.5, 0.0]);
        assert_eq!(fit_imputer(&x, ImputeStrategy::Mean), vec![4.5, 0.0]);
    }

    #[test]
    fn impute_fills_only_missing_cells() {
        let mut x = array![[1.0, f64::NAN], [f64::NAN, 2.0], [3.0, 4.0]];
        let step = fit_impute(&mut x, ImputeStrategy::Median);
        assert_eq!(x, array![[1.0, 3.0], [2.0, 2.0], [3.0, 4.0]]);
        assert!(matches!(step, Transform::SimpleImputer { strategy: ImputeStrategy::Median, .. }));
    }

    #[test]
    fn scaler_matches_serving_step() {
        let x = array![[2.0, 1.0], [2.0, 3.0], [2.0, 5.0]];
        let (step, scaled) = fit_scaler(x.clone(), &array![0, 1, 1], &["a".into(), "b".into()]).unwrap();
        let Transform::StandardScaler { mean, scale } = &step else { panic!("expected scaler") };
        assert!((mean[1] - 3.0).abs() < 1e-12);
        assert!((scale[0] - 1.0).abs() < 1e-12);
        for (i, row) in x.outer_iter().enumerate() {
            let mut served = row.to_vec();
            step.apply(&mut served);
            for (a, b) in served.iter().zip(scaled.row(i)) { assert!((a - b).abs() < 1e-9); }
        }
    }

    #[test]
    fn overflowing_column_is_reported() {
        let x = array![[1e308, 1.0], [1.7e308, 2.0], [1.0, 3.0]];
        let err = fit_scaler(x, &array![0, 1, 0], &["glucose".into(), "age".into()]).unwrap_err();
        assert!(matches!(&err, DatasetError::Overflow(m) if m.contains("glucose")), "{err}");
    }
}
