use serde::Serialize;
use std::f64::consts::LOG2_10;

use crate::errors::{
    DataProcessingError,
    Result,
};
use crate::hyperparameters::Hyperparameters;
use crate::models::DiscretizedDistribution;

/// Comparison of two groups, `first - second` in log10 ratio units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPairResult {
    /// Indices of the compared groups, `first < second`.
    pub groups: (usize, usize),
    pub difference: DiscretizedDistribution,
    /// `log2(10^E[difference])`
    pub log2_fold_change: f64,
    /// Posterior mass on differences whose absolute log2 fold change is
    /// below the configured threshold.
    pub prob_below_fold_change: f64,
}

impl GroupPairResult {
    /// ```
    /// use protquant::models::DiscretizedDistribution;
    /// use protquant::posterior::GroupPairResult;
    ///
    /// let grid = vec![-1.0, -0.5, 0.0, 0.5, 1.0];
    /// let first = DiscretizedDistribution::point_mass(grid.clone(), 4).unwrap();
    /// let second = DiscretizedDistribution::point_mass(grid, 2).unwrap();
    /// let res = GroupPairResult::new((0, 1), &first, &second, 1.0).unwrap();
    /// // 10x more protein in the first group
    /// assert!((res.log2_fold_change - 10f64.log2()).abs() < 1e-12);
    /// assert_eq!(res.prob_below_fold_change, 0.0);
    /// ```
    pub fn new(
        groups: (usize, usize),
        first: &DiscretizedDistribution,
        second: &DiscretizedDistribution,
        fold_change_eval: f64,
    ) -> Result<Self> {
        let difference = first.difference(second)?;
        let log2_fold_change = difference.expectation() * LOG2_10;
        let prob_below_fold_change = prob_below_fold_change(&difference, fold_change_eval);
        Ok(Self {
            groups,
            difference,
            log2_fold_change,
            prob_below_fold_change,
        })
    }
}

/// Mass of a log10 difference distribution where `|log2 fold change| < threshold`.
pub fn prob_below_fold_change(difference: &DiscretizedDistribution, threshold: f64) -> f64 {
    difference.mass_where(|d| (d * LOG2_10).abs() < threshold)
}

/// Every group pair `(i, j)` with `i < j`, in lexicographic order.
pub fn group_differences(
    group_posteriors: &[DiscretizedDistribution],
    params: &Hyperparameters,
) -> Result<Vec<GroupPairResult>> {
    if group_posteriors.len() != params.groups().len() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: params.groups().len(),
            other: group_posteriors.len(),
            context: "group posteriors".to_string(),
        }
        .into());
    }
    params
        .groups()
        .pairs()
        .map(|(i, j)| {
            GroupPairResult::new(
                (i, j),
                &group_posteriors[i],
                &group_posteriors[j],
                params.fold_change_eval(),
            )
        })
        .collect()
}
