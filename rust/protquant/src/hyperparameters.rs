//! Run-wide, read-only model parameters.
//!
//! [`Hyperparameters`] is what the inference consumes: grids, prior and
//! in-group kernels already laid out as arrays. It can be built directly from
//! arrays produced by an external calibration, or expanded from the scalar
//! [`HyperparameterConfig`] with [`Hyperparameters::from_config`].

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::errors::{
    ProtQuantError,
    Result,
};
use crate::models::SampleGroups;
use crate::models::distribution::difference_grid;
use crate::probability::{
    gamma_densities,
    hypsec_density,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Relative tolerance when checking that a candidate grid is evenly spaced.
const GRID_SPACING_RTOL: f64 = 1e-6;

/// Detection and noise parameters of the per-feature observation model.
///
/// All locations and scales are in log10 intensity units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationModel {
    /// Log10 intensity at which a feature is detected half the time.
    pub mu_detect: f64,
    pub sigma_detect: f64,
    /// Location of the (hyperbolic secant) quantification noise.
    pub mu_feature_diff: f64,
    pub sigma_feature_diff: f64,
}

impl ObservationModel {
    fn validate(&self) -> Result<()> {
        let locations = [self.mu_detect, self.mu_feature_diff];
        if locations.iter().any(|x| !x.is_finite()) {
            return Err(ProtQuantError::config(format!(
                "observation model locations must be finite: {:?}",
                self
            )));
        }
        let scales = [self.sigma_detect, self.sigma_feature_diff];
        if scales.iter().any(|x| !(x.is_finite() && *x > 0.0)) {
            return Err(ProtQuantError::config(format!(
                "observation model scales must be finite and > 0: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Expected spread of a protein's quantity between samples of one group.
///
/// Every kernel lives on the difference grid of the candidates
/// (`2 * n_candidates - 1` entries, centered on zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InGroupVariability {
    /// Same kernel for every group.
    Global(Vec<f64>),
    /// One kernel per group, in group order.
    PerGroup(Vec<Vec<f64>>),
    /// Unknown in-group standard deviation, integrated out under a Gamma prior.
    Marginalized {
        sigma_candidates: Vec<f64>,
        /// One kernel per sigma candidate.
        kernels: Vec<Vec<f64>>,
        shape: f64,
        scale: f64,
    },
}

/// Resolved view of [`InGroupVariability`] for a single group.
#[derive(Debug, Clone, Copy)]
pub enum GroupKernel<'a> {
    Fixed(&'a [f64]),
    Marginalized {
        kernels: &'a [Vec<f64>],
        sigma_weights: &'a [f64],
    },
}

/// Built through [`Hyperparameters::new`] or [`Hyperparameters::from_config`]
/// so that grids, prior and kernels are always consistent with each other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hyperparameters {
    observation: ObservationModel,
    candidates: Vec<f64>,
    diff_candidates: Vec<f64>,
    prior: Vec<f64>,
    groups: SampleGroups,
    in_group: InGroupVariability,
    /// Gamma prior evaluated at the sigma candidates, empty unless marginalized.
    sigma_weights: Vec<f64>,
    fold_change_eval: f64,
    max_iterations: usize,
}

impl Hyperparameters {
    /// Validates and assembles a set of hyperparameters.
    ///
    /// # Arguments
    /// * `candidates` - evenly spaced, ascending log10 ratio grid.
    /// * `prior` - prior weights over `candidates` (normalized here).
    /// * `fold_change_eval` - log2 fold change below which a difference is
    ///   considered negligible.
    pub fn new(
        observation: ObservationModel,
        candidates: Vec<f64>,
        prior: Vec<f64>,
        groups: SampleGroups,
        in_group: InGroupVariability,
        fold_change_eval: f64,
    ) -> Result<Self> {
        observation.validate()?;
        check_candidate_grid(&candidates)?;

        let prior = normalized_weights(prior, candidates.len(), "prior")?;
        let diff_candidates = difference_grid(&candidates);
        let kernel_len = diff_candidates.len();

        let sigma_weights = match &in_group {
            InGroupVariability::Global(kernel) => {
                check_weights(kernel, kernel_len, "in-group kernel")?;
                Vec::new()
            }
            InGroupVariability::PerGroup(kernels) => {
                if kernels.len() != groups.len() {
                    return Err(ProtQuantError::config(format!(
                        "{} in-group kernels for {} groups",
                        kernels.len(),
                        groups.len()
                    )));
                }
                for kernel in kernels.iter() {
                    check_weights(kernel, kernel_len, "in-group kernel")?;
                }
                Vec::new()
            }
            InGroupVariability::Marginalized {
                sigma_candidates,
                kernels,
                shape,
                scale,
            } => {
                if sigma_candidates.is_empty() || kernels.len() != sigma_candidates.len() {
                    return Err(ProtQuantError::config(format!(
                        "{} kernels for {} sigma candidates",
                        kernels.len(),
                        sigma_candidates.len()
                    )));
                }
                for kernel in kernels.iter() {
                    check_weights(kernel, kernel_len, "in-group kernel")?;
                }
                let weights = gamma_densities(sigma_candidates, *shape, *scale)?;
                if !weights.iter().any(|w| *w > 0.0) || weights.iter().any(|w| !w.is_finite()) {
                    return Err(ProtQuantError::config(format!(
                        "gamma prior (shape {}, scale {}) has no finite positive mass on the sigma candidates",
                        shape, scale
                    )));
                }
                weights
            }
        };

        if !(fold_change_eval.is_finite() && fold_change_eval >= 0.0) {
            return Err(ProtQuantError::config(format!(
                "fold change threshold must be finite and >= 0, got {}",
                fold_change_eval
            )));
        }

        Ok(Self {
            observation,
            candidates,
            diff_candidates,
            prior,
            groups,
            in_group,
            sigma_weights,
            fold_change_eval,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    /// Expands scalar, already calibrated parameters into grids and kernels.
    ///
    /// * candidates: `grid.min ..= grid.max` in steps of `grid.step`
    /// * prior: hyperbolic secant over the candidates
    /// * in-group kernels: zero-centered hyperbolic secant over the
    ///   difference grid, each normalized to sum to one. One kernel when
    ///   `in_group_marginalization` is unset, one per sigma candidate otherwise.
    pub fn from_config(config: &HyperparameterConfig, groups: SampleGroups) -> Result<Self> {
        let candidates = config.grid.build()?;
        let prior = candidates
            .iter()
            .map(|&x| hypsec_density(x, config.mu_protein, config.sigma_protein))
            .collect();
        let diff_candidates = difference_grid(&candidates);

        let in_group = match &config.in_group_marginalization {
            None => InGroupVariability::Global(in_group_kernel(
                &diff_candidates,
                config.in_group_sigma,
            )?),
            Some(marg) => {
                let sigma_candidates = marg.sigma_candidates()?;
                let kernels = sigma_candidates
                    .iter()
                    .map(|&sigma| in_group_kernel(&diff_candidates, sigma))
                    .collect::<Result<Vec<_>>>()?;
                InGroupVariability::Marginalized {
                    sigma_candidates,
                    kernels,
                    shape: marg.shape,
                    scale: marg.scale,
                }
            }
        };

        let out = Self::new(
            config.observation(),
            candidates,
            prior,
            groups,
            in_group,
            config.fold_change_eval,
        )?
        .with_max_iterations(config.max_iterations)?;
        debug!(
            "Built hyperparameters with {} candidates, {} groups",
            out.candidates.len(),
            out.groups.len()
        );
        Ok(out)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        if max_iterations == 0 {
            return Err(ProtQuantError::config("max_iterations must be >= 1"));
        }
        self.max_iterations = max_iterations;
        Ok(self)
    }

    pub fn observation(&self) -> &ObservationModel {
        &self.observation
    }

    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    pub fn diff_candidates(&self) -> &[f64] {
        &self.diff_candidates
    }

    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    pub fn groups(&self) -> &SampleGroups {
        &self.groups
    }

    pub fn num_samples(&self) -> usize {
        self.groups.num_samples()
    }

    pub fn in_group(&self) -> &InGroupVariability {
        &self.in_group
    }

    pub fn fold_change_eval(&self) -> f64 {
        self.fold_change_eval
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// In-group kernel(s) that apply to the group at `group_index`.
    pub fn group_kernel(&self, group_index: usize) -> Result<GroupKernel<'_>> {
        match &self.in_group {
            InGroupVariability::Global(kernel) => Ok(GroupKernel::Fixed(kernel)),
            InGroupVariability::PerGroup(kernels) => kernels
                .get(group_index)
                .map(|k| GroupKernel::Fixed(k))
                .ok_or_else(|| {
                    ProtQuantError::config(format!("no in-group kernel for group {}", group_index))
                }),
            InGroupVariability::Marginalized { kernels, .. } => Ok(GroupKernel::Marginalized {
                kernels: kernels.as_slice(),
                sigma_weights: self.sigma_weights.as_slice(),
            }),
        }
    }
}

fn check_candidate_grid(candidates: &[f64]) -> Result<()> {
    if candidates.len() < 2 {
        return Err(ProtQuantError::config(
            "the candidate grid needs at least two values",
        ));
    }
    if candidates.iter().any(|x| !x.is_finite()) {
        return Err(ProtQuantError::config("the candidate grid has non-finite values"));
    }
    let step = candidates[1] - candidates[0];
    if !(step > 0.0) {
        return Err(ProtQuantError::config("the candidate grid must be ascending"));
    }
    for w in candidates.windows(2) {
        if ((w[1] - w[0]) - step).abs() > GRID_SPACING_RTOL * step {
            return Err(ProtQuantError::config(format!(
                "the candidate grid must be evenly spaced (step {} vs {})",
                w[1] - w[0],
                step
            )));
        }
    }
    Ok(())
}

fn check_weights(weights: &[f64], expected_len: usize, what: &str) -> Result<()> {
    if weights.len() != expected_len {
        return Err(ProtQuantError::config(format!(
            "{} has {} entries, expected {}",
            what,
            weights.len(),
            expected_len
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(ProtQuantError::config(format!(
            "{} must be finite and non-negative",
            what
        )));
    }
    if !weights.iter().any(|w| *w > 0.0) {
        return Err(ProtQuantError::config(format!("{} has no mass", what)));
    }
    Ok(())
}

fn normalized_weights(mut weights: Vec<f64>, expected_len: usize, what: &str) -> Result<Vec<f64>> {
    check_weights(&weights, expected_len, what)?;
    let total: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= total);
    Ok(weights)
}

fn in_group_kernel(diff_candidates: &[f64], sigma: f64) -> Result<Vec<f64>> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(ProtQuantError::config(format!(
            "in-group sigma must be finite and > 0, got {}",
            sigma
        )));
    }
    let kernel = diff_candidates
        .iter()
        .map(|&d| hypsec_density(d, 0.0, sigma))
        .collect();
    normalized_weights(kernel, diff_candidates.len(), "in-group kernel")
}

/// Evenly spaced log10 ratio grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min: -5.0,
            max: 5.0,
            step: 0.01,
        }
    }
}

impl GridConfig {
    /// ```
    /// use protquant::hyperparameters::GridConfig;
    ///
    /// let grid = GridConfig { min: -1.0, max: 1.0, step: 0.5 }.build().unwrap();
    /// assert_eq!(grid, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    /// ```
    pub fn build(&self) -> Result<Vec<f64>> {
        let finite = self.min.is_finite() && self.max.is_finite();
        if !finite || !(self.step > 0.0) || !(self.max > self.min) {
            return Err(ProtQuantError::config(format!("invalid grid {:?}", self)));
        }
        let n = ((self.max - self.min) / self.step).round() as usize + 1;
        Ok((0..n).map(|i| self.min + i as f64 * self.step).collect())
    }
}

/// Gamma prior over the in-group standard deviation plus the grid of
/// standard deviations it is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginalizationConfig {
    pub shape: f64,
    pub scale: f64,
    pub min_sigma: f64,
    pub max_sigma: f64,
    pub num_sigma_candidates: usize,
}

impl Default for MarginalizationConfig {
    fn default() -> Self {
        Self {
            shape: 2.0,
            scale: 0.05,
            min_sigma: 0.01,
            max_sigma: 1.0,
            num_sigma_candidates: 50,
        }
    }
}

impl MarginalizationConfig {
    pub fn sigma_candidates(&self) -> Result<Vec<f64>> {
        if self.num_sigma_candidates == 0
            || !(self.min_sigma > 0.0)
            || !(self.max_sigma >= self.min_sigma)
        {
            return Err(ProtQuantError::config(format!(
                "invalid sigma candidates {:?}",
                self
            )));
        }
        if self.num_sigma_candidates == 1 {
            return Ok(vec![self.min_sigma]);
        }
        let step = (self.max_sigma - self.min_sigma) / (self.num_sigma_candidates - 1) as f64;
        Ok((0..self.num_sigma_candidates)
            .map(|i| self.min_sigma + i as f64 * step)
            .collect())
    }
}

/// Scalar hyperparameters, as produced by a calibration step or written by
/// hand in a config file. Missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperparameterConfig {
    pub mu_detect: f64,
    pub sigma_detect: f64,
    pub mu_feature_diff: f64,
    pub sigma_feature_diff: f64,
    pub mu_protein: f64,
    pub sigma_protein: f64,
    pub in_group_sigma: f64,
    pub in_group_marginalization: Option<MarginalizationConfig>,
    /// log2 fold change threshold.
    pub fold_change_eval: f64,
    pub grid: GridConfig,
    pub max_iterations: usize,
}

impl Default for HyperparameterConfig {
    fn default() -> Self {
        Self {
            mu_detect: 4.5,
            sigma_detect: 0.4,
            mu_feature_diff: 0.0,
            sigma_feature_diff: 0.1,
            mu_protein: 0.0,
            sigma_protein: 0.2,
            in_group_sigma: 0.05,
            in_group_marginalization: None,
            fold_change_eval: 1.0,
            grid: GridConfig::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl HyperparameterConfig {
    pub fn observation(&self) -> ObservationModel {
        ObservationModel {
            mu_detect: self.mu_detect,
            sigma_detect: self.sigma_detect,
            mu_feature_diff: self.mu_feature_diff,
            sigma_feature_diff: self.sigma_feature_diff,
        }
    }
}
