//! Posterior distributions of a single protein's relative quantity.
//!
//! The pipeline for one protein is:
//! 1. [`fixed_point::estimate_reference_levels`] alternates between per-sample
//!    posteriors ([`sample::sample_posteriors`]) and the reference level of
//!    each sample until those levels settle.
//! 2. [`group::group_posteriors`] pools the sample posteriors of each group.
//! 3. [`difference::group_differences`] compares every pair of groups.
//!
//! [`get_posteriors`] runs all of it.

pub mod difference;
pub mod fixed_point;
pub mod group;
pub mod sample;

use serde::Serialize;
use tracing::debug;

pub use difference::GroupPairResult;

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

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProteinPosteriors {
    /// Relative protein level per sample, geometric mean 1.
    pub reference_levels: Vec<f64>,
    pub sample_posteriors: Vec<DiscretizedDistribution>,
    /// One per group, in group order.
    pub group_posteriors: Vec<DiscretizedDistribution>,
    pub pair_results: Vec<GroupPairResult>,
    pub iterations: usize,
    pub converged: bool,
}

impl ProteinPosteriors {
    pub fn pair(&self, first: usize, second: usize) -> Option<&GroupPairResult> {
        self.pair_results
            .iter()
            .find(|r| r.groups == (first, second))
    }
}

/// Full posterior inference for one protein.
///
/// `rows` are the protein's features. Each needs one entry per sample in
/// `params.groups()`.
///
/// ```
/// use protquant::hyperparameters::{GridConfig, HyperparameterConfig, Hyperparameters};
/// use protquant::models::{QuantRow, SampleGroup, SampleGroups};
/// use protquant::posterior::get_posteriors;
///
/// let groups = SampleGroups::new(vec![
///     SampleGroup { label: "ctrl".into(), samples: vec![0, 1] },
///     SampleGroup { label: "treated".into(), samples: vec![2, 3] },
/// ])
/// .unwrap();
/// let config = HyperparameterConfig {
///     grid: GridConfig { min: -2.0, max: 2.0, step: 0.05 },
///     ..Default::default()
/// };
/// let params = Hyperparameters::from_config(&config, groups).unwrap();
/// let rows = vec![
///     QuantRow::new("PEPTIDEA", vec![1e6, 1.1e6, 1e7, 1.2e7], vec![0.01; 4], vec![0.0; 4]).unwrap(),
///     QuantRow::new("PEPTIDEB", vec![2e5, 2.1e5, 2e6, 1.9e6], vec![0.01; 4], vec![0.0; 4]).unwrap(),
/// ];
/// let out = get_posteriors(&rows, &params).unwrap();
/// assert_eq!(out.group_posteriors.len(), 2);
/// assert!(out.pair(0, 1).unwrap().log2_fold_change < 0.0);
/// ```
#[tracing::instrument(level = "debug", skip_all)]
pub fn get_posteriors(rows: &[QuantRow], params: &Hyperparameters) -> Result<ProteinPosteriors> {
    let matrix = QuantMatrix::from_rows(rows)?;
    if matrix.num_samples() != params.num_samples() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: params.num_samples(),
            other: matrix.num_samples(),
            context: "samples in quant rows vs samples in groups".to_string(),
        }
        .into());
    }

    let reference = fixed_point::estimate_reference_levels(&matrix, rows, params)?;
    debug!(
        "Reference levels after {} iterations (converged: {}): {:?}",
        reference.iterations, reference.converged, reference.reference
    );
    let group_posteriors = group::group_posteriors(&reference.posteriors, params)?;
    let pair_results = difference::group_differences(&group_posteriors, params)?;

    Ok(ProteinPosteriors {
        reference_levels: reference.reference,
        sample_posteriors: reference.posteriors,
        group_posteriors,
        pair_results,
        iterations: reference.iterations,
        converged: reference.converged,
    })
}
