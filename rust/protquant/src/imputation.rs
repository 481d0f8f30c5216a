use ndarray::{
    Array2,
    Array3,
};

use crate::models::QuantMatrix;

/// Mean log10 ionization efficiency of every feature, as seen from each
/// sample, using only the *other* samples that observed the feature.
///
/// `out[[f, s]] = mean_{s' != s, observed}(log10(x[f, s']) - log10(reference[s']))`
///
/// Leaving sample `s` out keeps its own intensity from feeding the value it
/// is later compared against. NaN where no other sample observed the feature.
pub fn leave_one_out_ionization(matrix: &QuantMatrix, reference: &[f64]) -> Array2<f64> {
    let (num_features, num_samples) = matrix.as_array().dim();
    debug_assert_eq!(reference.len(), num_samples);

    let mut log_ion_eff = matrix.log10_intensities();
    for (s, &level) in reference.iter().enumerate() {
        let log_level = level.log10();
        log_ion_eff
            .column_mut(s)
            .mapv_inplace(|x| x - log_level);
    }

    let mut out = Array2::from_elem((num_features, num_samples), f64::NAN);
    for (f, row) in log_ion_eff.rows().into_iter().enumerate() {
        let (total, count) = row
            .iter()
            .filter(|x| !x.is_nan())
            .fold((0.0, 0usize), |(t, c), x| (t + x, c + 1));
        for (s, &own) in row.iter().enumerate() {
            let (total, count) = if own.is_nan() {
                (total, count)
            } else {
                (total - own, count - 1)
            };
            if count > 0 {
                out[[f, s]] = total / count as f64;
            }
        }
    }
    out
}

/// Expected log10 intensity of every feature in every sample, for each
/// candidate protein ratio.
///
/// `out[[f, s, c]] = leave_one_out_ionization[[f, s]] + candidates[c]`
///
/// # Example
///
/// ```
/// use protquant::imputation::impute_values;
/// use protquant::models::{QuantMatrix, QuantRow};
///
/// let rows = vec![QuantRow::new("a", vec![100.0, 1000.0], vec![0.0; 2], vec![0.0; 2]).unwrap()];
/// let matrix = QuantMatrix::from_rows(&rows).unwrap();
/// let imputed = impute_values(&matrix, &[1.0, 1.0], &[-1.0, 0.0, 1.0]);
/// // Sample 0 is imputed from sample 1 only
/// assert!((imputed[[0, 0, 1]] - 3.0).abs() < 1e-12);
/// assert!((imputed[[0, 1, 2]] - 3.0).abs() < 1e-12);
/// ```
pub fn impute_values(matrix: &QuantMatrix, reference: &[f64], candidates: &[f64]) -> Array3<f64> {
    let mean_log_ion_eff = leave_one_out_ionization(matrix, reference);
    let (num_features, num_samples) = mean_log_ion_eff.dim();
    Array3::from_shape_fn((num_features, num_samples, candidates.len()), |(f, s, c)| {
        mean_log_ion_eff[[f, s]] + candidates[c]
    })
}
