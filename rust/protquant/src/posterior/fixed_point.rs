use tracing::{
    debug,
    trace,
};

use super::sample::sample_posteriors;
use crate::errors::{
    DataProcessingError,
    Result,
};
use crate::hyperparameters::Hyperparameters;
use crate::models::{
    DiscretizedDistribution,
    QuantMatrix,
    QuantRow,
};

/// Largest squared log10 change of any reference level still counted as converged.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-4;

/// State carried between iterations of the reference level estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPointState {
    /// Relative abundance of the protein in every sample, geometric mean 1.
    pub reference: Vec<f64>,
    /// Posteriors computed from `reference`'s predecessor. Empty before the
    /// first step.
    pub posteriors: Vec<DiscretizedDistribution>,
    pub iteration: usize,
}

impl FixedPointState {
    pub fn initial(num_samples: usize) -> Self {
        Self {
            reference: vec![1.0; num_samples],
            posteriors: Vec::new(),
            iteration: 0,
        }
    }
}

/// Outcome of running [`estimate_reference_levels`] to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEstimate {
    pub reference: Vec<f64>,
    pub posteriors: Vec<DiscretizedDistribution>,
    pub iterations: usize,
    pub converged: bool,
}

/// Rescales `values` so their geometric mean is 1.
///
/// ```
/// use protquant::posterior::fixed_point::geometric_normalize;
///
/// let out = geometric_normalize(&[2.0, 8.0]).unwrap();
/// assert!((out[0] - 0.5).abs() < 1e-12);
/// assert!((out[1] - 2.0).abs() < 1e-12);
/// ```
pub fn geometric_normalize(values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("geometric normalization".to_string()),
        }
        .into());
    }
    if values.iter().any(|x| !x.is_finite() || *x <= 0.0) {
        return Err(DataProcessingError::ExpectedFiniteNonNanData {
            context: format!("positive values for geometric normalization, got {:?}", values),
        }
        .into());
    }
    let mean_log = values.iter().map(|x| x.log10()).sum::<f64>() / values.len() as f64;
    Ok(values
        .iter()
        .map(|x| 10f64.powf(x.log10() - mean_log))
        .collect())
}

/// Largest squared difference between the log10 of two reference vectors.
pub fn max_squared_log_change(previous: &[f64], next: &[f64]) -> f64 {
    previous
        .iter()
        .zip(next.iter())
        .map(|(a, b)| (a.log10() - b.log10()).powi(2))
        .fold(0.0, f64::max)
}

/// A single update: posteriors under the current reference levels, then new
/// reference levels from their point estimates.
///
/// Returns the next state and whether the levels moved less than
/// [`CONVERGENCE_TOLERANCE`].
pub fn fixed_point_step(
    state: &FixedPointState,
    matrix: &QuantMatrix,
    rows: &[QuantRow],
    params: &Hyperparameters,
) -> Result<(FixedPointState, bool)> {
    let estimates = sample_posteriors(matrix, rows, &state.reference, params)?;
    let reference = geometric_normalize(&estimates.point_estimates)?;
    let change = max_squared_log_change(&state.reference, &reference);
    trace!(
        "Iteration {}: max squared log10 change {:.3e}",
        state.iteration + 1,
        change
    );
    let next = FixedPointState {
        reference,
        posteriors: estimates.posteriors,
        iteration: state.iteration + 1,
    };
    Ok((next, change < CONVERGENCE_TOLERANCE))
}

/// Alternates between per-sample posteriors and reference levels until the
/// levels stop moving, or `params.max_iterations()` steps have run.
///
/// Hitting the cap is not an error, the last state is returned with
/// `converged == false`.
#[tracing::instrument(level = "trace", skip_all)]
pub fn estimate_reference_levels(
    matrix: &QuantMatrix,
    rows: &[QuantRow],
    params: &Hyperparameters,
) -> Result<ReferenceEstimate> {
    let mut state = FixedPointState::initial(matrix.num_samples());
    let mut converged = false;
    while state.iteration < params.max_iterations() {
        let (next, done) = fixed_point_step(&state, matrix, rows, params)?;
        state = next;
        if done {
            converged = true;
            break;
        }
    }
    if !converged {
        debug!(
            "Reference levels did not converge after {} iterations",
            state.iteration
        );
    }
    Ok(ReferenceEstimate {
        reference: state.reference,
        posteriors: state.posteriors,
        iterations: state.iteration,
        converged,
    })
}
