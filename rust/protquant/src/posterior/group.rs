use crate::errors::{
    DataProcessingError,
    Result,
};
use crate::hyperparameters::{
    GroupKernel,
    Hyperparameters,
};
use crate::models::DiscretizedDistribution;
use crate::probability::SMALLEST_POSITIVE;

/// Sum over members of ln(member posterior convolved with `kernel`).
fn summed_log_convolutions(members: &[&DiscretizedDistribution], kernel: &[f64]) -> Result<Vec<f64>> {
    let mut total: Option<Vec<f64>> = None;
    for member in members.iter() {
        let conv = member.convolve_with_kernel(kernel)?;
        match total.as_mut() {
            None => {
                total = Some(
                    conv.into_iter()
                        .map(|x| x.max(SMALLEST_POSITIVE).ln())
                        .collect(),
                )
            }
            Some(acc) => {
                for (a, x) in acc.iter_mut().zip(conv.into_iter()) {
                    *a += x.max(SMALLEST_POSITIVE).ln();
                }
            }
        }
    }
    total.ok_or_else(|| {
        DataProcessingError::ExpectedNonEmptyData {
            context: Some("group without member posteriors".to_string()),
        }
        .into()
    })
}

/// Posterior of a group's protein ratio given its members' posteriors.
///
/// Each member posterior is smeared by the in-group kernel, then the members
/// are combined as independent evidence:
/// `P(g = c) ∝ Π_s Σ_c' P(s = c') · K(c - c')`
///
/// With a marginalized kernel the product is computed per sigma candidate
/// and the results are mixed with the Gamma prior weights (in log space).
pub fn group_posterior(
    members: &[&DiscretizedDistribution],
    kernel: GroupKernel<'_>,
) -> Result<DiscretizedDistribution> {
    let grid = members
        .first()
        .ok_or(DataProcessingError::ExpectedNonEmptyData {
            context: Some("group without member posteriors".to_string()),
        })?
        .grid()
        .to_vec();

    let log_masses = match kernel {
        GroupKernel::Fixed(kernel) => summed_log_convolutions(members, kernel)?,
        GroupKernel::Marginalized {
            kernels,
            sigma_weights,
        } => {
            if kernels.len() != sigma_weights.len() {
                return Err(DataProcessingError::ExpectedSlicesSameLength {
                    expected: kernels.len(),
                    other: sigma_weights.len(),
                    context: "in-group kernels vs sigma weights".to_string(),
                }
                .into());
            }
            let per_sigma = kernels
                .iter()
                .zip(sigma_weights.iter())
                .filter(|(_, w)| **w > 0.0)
                .map(|(k, w)| {
                    let mut logs = summed_log_convolutions(members, k)?;
                    let log_w = w.ln();
                    logs.iter_mut().for_each(|x| *x += log_w);
                    Ok(logs)
                })
                .collect::<Result<Vec<_>>>()?;
            log_sum_exp_columns(&per_sigma, grid.len())
        }
    };

    DiscretizedDistribution::from_log_masses(grid, log_masses)
}

/// Element-wise `ln(Σ_k exp(rows[k][c]))`.
fn log_sum_exp_columns(rows: &[Vec<f64>], len: usize) -> Vec<f64> {
    (0..len)
        .map(|c| {
            let max = rows.iter().map(|r| r[c]).fold(f64::NEG_INFINITY, f64::max);
            if !max.is_finite() {
                return max;
            }
            max + rows.iter().map(|r| (r[c] - max).exp()).sum::<f64>().ln()
        })
        .collect()
}

/// One posterior per group, in group order.
pub fn group_posteriors(
    sample_posteriors: &[DiscretizedDistribution],
    params: &Hyperparameters,
) -> Result<Vec<DiscretizedDistribution>> {
    params
        .groups()
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let members = group
                .samples
                .iter()
                .map(|&s| {
                    sample_posteriors.get(s).ok_or_else(|| {
                        DataProcessingError::ExpectedSlicesSameLength {
                            expected: params.num_samples(),
                            other: sample_posteriors.len(),
                            context: format!("sample posteriors for group '{}'", group.label),
                        }
                        .into()
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            group_posterior(&members, params.group_kernel(i)?)
        })
        .collect()
}
