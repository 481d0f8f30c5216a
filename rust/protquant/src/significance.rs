//! Multiple-comparison control from posterior error probabilities.
//!
//! The probability that a comparison's fold change is below the threshold is
//! the posterior probability that calling it "changed" is wrong. Averaging
//! those over the most confident calls gives the expected false discovery
//! rate at each cutoff.

use crate::posterior::ProteinPosteriors;

pub trait LabelledPosterior {
    /// Posterior error probability, lower is more confident.
    fn get_error_probability(&self) -> f64;
    fn assign_qval(&mut self, q: f64);
    fn get_qval(&self) -> f64;
}

/// Sorts `items` by error probability (most confident first) and assigns
/// posterior q-values in place.
///
/// ```
/// use protquant::significance::{LabelledPosterior, assign_posterior_qvalues};
///
/// struct Call {
///     pep: f64,
///     qval: f64,
/// }
///
/// impl LabelledPosterior for Call {
///     fn get_error_probability(&self) -> f64 {
///         self.pep
///     }
///     fn assign_qval(&mut self, q: f64) {
///         self.qval = q
///     }
///     fn get_qval(&self) -> f64 {
///         self.qval
///     }
/// }
///
/// let mut items: Vec<Call> = [0.3, 0.01, 0.05]
///     .iter()
///     .map(|&pep| Call { pep, qval: 1.0 })
///     .collect();
/// assign_posterior_qvalues(&mut items);
/// assert_eq!(items[0].pep, 0.01);
/// assert!((items[1].qval - 0.03).abs() < 1e-12);
/// assert!((items[2].qval - 0.12).abs() < 1e-12);
/// ```
pub fn assign_posterior_qvalues<T: LabelledPosterior>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.get_error_probability()
            .total_cmp(&b.get_error_probability())
    });

    // Running mean of the error probabilities
    let mut total = 0.0;
    for (i, item) in items.iter_mut().enumerate() {
        total += item.get_error_probability();
        item.assign_qval(total / (i + 1) as f64);
    }

    // Reverse slice, and calculate the cumulative minimum
    let mut q_min = 1.0f64;
    for item in items.iter_mut().rev() {
        q_min = q_min.min(item.get_qval());
        item.assign_qval(q_min);
    }
}

/// A single group comparison of one protein, ready for q-value assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredComparison {
    pub protein: String,
    pub groups: (usize, usize),
    pub num_features: usize,
    pub log2_fold_change: f64,
    /// Posterior standard deviation of the log2 fold change.
    pub log2_fold_change_sd: f64,
    pub prob_below_fold_change: f64,
    /// Expected log2 abundance of each group in the pair.
    pub group_log2_abundances: (f64, f64),
    pub qval: f64,
}

impl ScoredComparison {
    /// One entry per group pair of `posteriors`.
    pub fn from_posteriors(
        protein: &str,
        num_features: usize,
        posteriors: &ProteinPosteriors,
    ) -> Vec<Self> {
        let log2_abundance = |g: usize| {
            posteriors
                .group_posteriors
                .get(g)
                .map(|d| d.expectation() * std::f64::consts::LOG2_10)
                .unwrap_or(f64::NAN)
        };
        posteriors
            .pair_results
            .iter()
            .map(|res| Self {
                protein: protein.to_string(),
                groups: res.groups,
                num_features,
                log2_fold_change: res.log2_fold_change,
                log2_fold_change_sd: res.difference.std_dev() * std::f64::consts::LOG2_10,
                prob_below_fold_change: res.prob_below_fold_change,
                group_log2_abundances: (log2_abundance(res.groups.0), log2_abundance(res.groups.1)),
                qval: 1.0,
            })
            .collect()
    }
}

impl LabelledPosterior for ScoredComparison {
    fn get_error_probability(&self) -> f64 {
        self.prob_below_fold_change
    }

    fn assign_qval(&mut self, q: f64) {
        self.qval = q
    }

    fn get_qval(&self) -> f64 {
        self.qval
    }
}
