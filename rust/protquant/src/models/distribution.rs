use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    DataProcessingError,
    Result,
};

/// A probability mass function over an ordered grid of candidate values.
///
/// The grid is a set of log10 ratios for protein quantities, or log10
/// differences of ratios for group comparisons. Masses are always
/// non-negative and, once built through one of the constructors, sum to 1.
///
/// # Example
///
/// ```
/// use protquant::models::DiscretizedDistribution;
///
/// let grid = vec![-1.0, 0.0, 1.0];
/// let dist = DiscretizedDistribution::from_unnormalized(grid, vec![1.0, 2.0, 1.0]).unwrap();
/// assert_eq!(dist.masses(), &[0.25, 0.5, 0.25]);
/// assert_eq!(dist.expectation(), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretizedDistribution {
    grid: Vec<f64>,
    masses: Vec<f64>,
}

impl DiscretizedDistribution {
    fn check_shapes(grid: &[f64], masses: &[f64], context: &str) -> Result<()> {
        if grid.is_empty() {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some(context.to_string()),
            }
            .into());
        }
        if grid.len() != masses.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: grid.len(),
                other: masses.len(),
                context: context.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Builds a distribution from non-negative weights, normalizing them.
    pub fn from_unnormalized(grid: Vec<f64>, mut masses: Vec<f64>) -> Result<Self> {
        Self::check_shapes(&grid, &masses, "DiscretizedDistribution::from_unnormalized")?;
        if masses.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(DataProcessingError::ExpectedFiniteNonNanData {
                context: "weights must be finite and non-negative".to_string(),
            }
            .into());
        }
        let total: f64 = masses.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(DataProcessingError::ExpectedFiniteNonNanData {
                context: format!("weights sum to {}", total),
            }
            .into());
        }
        masses.iter_mut().for_each(|x| *x /= total);
        Ok(Self { grid, masses })
    }

    /// Builds a distribution from unnormalized natural-log weights.
    ///
    /// Uses the usual subtract-max trick so that very negative
    /// log-likelihoods do not all underflow to zero.
    pub fn from_log_masses(grid: Vec<f64>, log_masses: Vec<f64>) -> Result<Self> {
        Self::check_shapes(&grid, &log_masses, "DiscretizedDistribution::from_log_masses")?;
        let masses = softmax(&log_masses)?;
        Ok(Self { grid, masses })
    }

    /// All the mass on a single grid point.
    pub fn point_mass(grid: Vec<f64>, index: usize) -> Result<Self> {
        if index >= grid.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: grid.len(),
                other: index,
                context: "point mass index out of range".to_string(),
            }
            .into());
        }
        let mut masses = vec![0.0; grid.len()];
        masses[index] = 1.0;
        Ok(Self { grid, masses })
    }

    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.grid.iter().copied().zip(self.masses.iter().copied())
    }

    /// Expected grid value, `sum(value * p)`.
    pub fn expectation(&self) -> f64 {
        self.iter().map(|(v, p)| v * p).sum()
    }

    /// Expectation of `10^value`, ie. the mean in linear space of a log10 grid.
    pub fn linear_expectation(&self) -> f64 {
        self.iter().map(|(v, p)| 10f64.powf(v) * p).sum()
    }

    pub fn variance(&self) -> f64 {
        let mean = self.expectation();
        self.iter().map(|(v, p)| p * (v - mean) * (v - mean)).sum()
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Grid value holding the most mass (first one on ties).
    pub fn mode_value(&self) -> f64 {
        let mut best = 0;
        for (i, p) in self.masses.iter().enumerate() {
            if *p > self.masses[best] {
                best = i;
            }
        }
        self.grid[best]
    }

    /// Total mass on the grid points for which `keep` returns true.
    pub fn mass_where(&self, keep: impl Fn(f64) -> bool) -> f64 {
        self.iter().filter(|(v, _)| keep(*v)).map(|(_, p)| p).sum()
    }

    /// Unnormalized posterior over this distribution's grid after
    /// smearing it with `kernel`.
    ///
    /// `kernel` lives on the difference grid of `self.grid()`, so it must
    /// have `2 * len - 1` entries, centered on a difference of zero.
    pub fn convolve_with_kernel(&self, kernel: &[f64]) -> Result<Vec<f64>> {
        let expected = 2 * self.len() - 1;
        if kernel.len() != expected {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected,
                other: kernel.len(),
                context: "in-group kernel must span the difference grid".to_string(),
            }
            .into());
        }
        Ok(convolve_valid(kernel, &self.masses))
    }

    /// Distribution of `self - other`, for two distributions on the same grid.
    ///
    /// The output lives on `difference_grid(self.grid())`.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        if self.grid != other.grid {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: self.len(),
                other: other.len(),
                context: "difference requires both distributions on the same grid".to_string(),
            }
            .into());
        }
        let reversed: Vec<f64> = other.masses.iter().rev().copied().collect();
        let masses = convolve_full(&self.masses, &reversed);
        Self::from_unnormalized(difference_grid(&self.grid), masses)
    }
}

/// Every difference `grid[i] - grid[j]` reachable on a uniform grid, in
/// ascending order. Has `2 * len - 1` entries and is centered on 0.
///
/// ```
/// use protquant::models::distribution::difference_grid;
///
/// assert_eq!(difference_grid(&[0.0, 1.0, 2.0]), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
/// ```
pub fn difference_grid(grid: &[f64]) -> Vec<f64> {
    if grid.is_empty() {
        return Vec::new();
    }
    let last = grid.len() - 1;
    let lower = grid.iter().map(|g| g - grid[last]);
    let upper = grid[1..].iter().map(|g| g - grid[0]);
    lower.chain(upper).collect()
}

/// Numerically stable softmax of natural-log weights.
pub fn softmax(log_masses: &[f64]) -> Result<Vec<f64>> {
    let max = log_masses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || log_masses.iter().any(|x| x.is_nan()) {
        return Err(DataProcessingError::ExpectedFiniteNonNanData {
            context: format!("softmax over log weights with maximum {}", max),
        }
        .into());
    }
    let mut out: Vec<f64> = log_masses.iter().map(|x| (x - max).exp()).collect();
    let total: f64 = out.iter().sum();
    out.iter_mut().for_each(|x| *x /= total);
    Ok(out)
}

/// Full discrete convolution, `out[n] = sum_i a[i] * b[n - i]`.
pub fn convolve_full(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// The part of the convolution of `long` and `short` where they fully
/// overlap. Output length is `long.len() - short.len() + 1`.
pub fn convolve_valid(long: &[f64], short: &[f64]) -> Vec<f64> {
    if short.is_empty() || long.len() < short.len() {
        return Vec::new();
    }
    let offset = short.len() - 1;
    (0..=(long.len() - short.len()))
        .map(|k| {
            short
                .iter()
                .enumerate()
                .map(|(j, &s)| long[k + offset - j] * s)
                .sum()
        })
        .collect()
}
