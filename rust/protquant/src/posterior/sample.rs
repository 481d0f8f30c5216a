use ndarray::Array2;
use tracing::trace;

use crate::errors::{
    DataProcessingError,
    ProtQuantError,
    Result,
};
use crate::hyperparameters::Hyperparameters;
use crate::imputation::impute_values;
use crate::models::{
    DiscretizedDistribution,
    QuantMatrix,
    QuantRow,
};
use crate::probability::{
    SMALLEST_POSITIVE,
    floor_probability,
    hypsec_density,
    p_missing,
};

/// Per-sample posteriors over the candidate grid plus their point estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEstimates {
    pub posteriors: Vec<DiscretizedDistribution>,
    /// Linear-space expectation of each posterior.
    pub point_estimates: Vec<f64>,
}

/// Feature-level terms that do not depend on the candidate ratio.
struct FeatureTerms {
    log_intensities: Array2<f64>,
    /// Number of samples that observed each feature.
    num_observed: Vec<usize>,
    /// Pr(missing | feature is not this protein's), from the feature's average.
    p_missing_geo_avg: Vec<f64>,
    /// Pr(observed value | wrong identification).
    p_quant_incorrect_id: Array2<f64>,
}

impl FeatureTerms {
    fn new(matrix: &QuantMatrix, params: &Hyperparameters) -> Self {
        let obs = params.observation();
        let log_intensities = matrix.log10_intensities();
        let num_observed = log_intensities
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|x| !x.is_nan()).count())
            .collect();
        // log10 of the geometric mean of the observed intensities, NaN if none
        let log_geo_avgs: Vec<f64> = log_intensities
            .rows()
            .into_iter()
            .map(|row| {
                let (total, count) = row
                    .iter()
                    .filter(|x| !x.is_nan())
                    .fold((0.0, 0usize), |(t, c), x| (t + x, c + 1));
                if count == 0 {
                    f64::NAN
                } else {
                    total / count as f64
                }
            })
            .collect();
        let p_missing_geo_avg = log_geo_avgs
            .iter()
            .map(|&x| p_missing(x, obs.mu_detect, obs.sigma_detect))
            .collect();
        let mut p_quant_incorrect_id = log_intensities.clone();
        for (mut row, &geo) in p_quant_incorrect_id
            .rows_mut()
            .into_iter()
            .zip(log_geo_avgs.iter())
        {
            row.mapv_inplace(|x| {
                hypsec_density(x - geo, obs.mu_feature_diff, obs.sigma_feature_diff)
            });
        }
        Self {
            log_intensities,
            num_observed,
            p_missing_geo_avg,
            p_quant_incorrect_id,
        }
    }
}

/// One pass of the per-sample posterior estimation, given the current
/// reference level of every sample.
///
/// For each sample the log posterior starts from the prior and accumulates
/// one likelihood term per feature. A term mixes "the feature belongs to this
/// protein" (its value, or its absence, is explained by the imputed
/// intensity under each candidate ratio) with "the identification or the
/// link is wrong" (explained by the feature's own average).
///
/// Features are left out of a sample's likelihood when:
/// * their identification PEP in that sample is 1,
/// * they were not observed in any sample,
/// * no *other* sample observed them, so nothing can be imputed.
///
/// # Errors
/// * `ExpectedSlicesSameLength` if `rows` or `reference` do not match `matrix`.
/// * `ExpectedFiniteNonNanData` if a reference level is not finite and positive.
/// * [`ProtQuantError::NanLikelihood`] if a term is NaN anyway.
#[tracing::instrument(level = "trace", skip_all)]
pub fn sample_posteriors(
    matrix: &QuantMatrix,
    rows: &[QuantRow],
    reference: &[f64],
    params: &Hyperparameters,
) -> Result<SampleEstimates> {
    let num_samples = matrix.num_samples();
    if rows.len() != matrix.num_features() || reference.len() != num_samples {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: matrix.num_features(),
            other: rows.len(),
            context: format!(
                "quant rows vs matrix, with {} reference levels for {} samples",
                reference.len(),
                num_samples
            ),
        }
        .into());
    }
    for row in rows.iter() {
        row.validate(num_samples)?;
    }
    if reference.iter().any(|x| !x.is_finite() || *x <= 0.0) {
        return Err(DataProcessingError::ExpectedFiniteNonNanData {
            context: format!("positive reference levels, got {:?}", reference),
        }
        .into());
    }

    let obs = params.observation();
    let candidates = params.candidates();
    let terms = FeatureTerms::new(matrix, params);
    let imputed = impute_values(matrix, reference, candidates);
    let log_prior: Vec<f64> = params
        .prior()
        .iter()
        .map(|p| p.max(SMALLEST_POSITIVE).ln())
        .collect();

    let mut posteriors = Vec::with_capacity(num_samples);
    let mut point_estimates = Vec::with_capacity(num_samples);
    for s in 0..num_samples {
        let mut log_posterior = log_prior.clone();
        for (f, row) in rows.iter().enumerate() {
            let ident_pep = row.identification_pep(s);
            let link_pep = row.link_pep(s);
            if ident_pep >= 1.0 || terms.num_observed[f] == 0 {
                continue;
            }
            if terms.num_observed[f] == 1 && matrix.is_observed(f, s) {
                trace!("Feature {} has nothing to impute sample {} from", f, s);
                continue;
            }
            let imputed_fs = imputed.slice(ndarray::s![f, s, ..]);

            let correct = (1.0 - ident_pep) * (1.0 - link_pep);
            let p_missing_avg = terms.p_missing_geo_avg[f];
            let log_x = terms.log_intensities[[f, s]];
            let observed = !log_x.is_nan();
            // Likelihood of the data when the feature does not follow the protein.
            let incorrect = if observed {
                (1.0 - p_missing_avg)
                    * (terms.p_quant_incorrect_id[[f, s]] * ident_pep * (1.0 - link_pep)
                        + link_pep)
            } else {
                p_missing_avg * (ident_pep * (1.0 - link_pep) + link_pep)
            };

            for (lp, &x_imp) in log_posterior.iter_mut().zip(imputed_fs.iter()) {
                let p_missing_cand = p_missing(x_imp, obs.mu_detect, obs.sigma_detect);
                let likelihood = if observed {
                    let p_diff =
                        hypsec_density(x_imp - log_x, obs.mu_feature_diff, obs.sigma_feature_diff);
                    (1.0 - p_missing_cand) * p_diff * correct + incorrect
                } else {
                    p_missing_cand * correct + incorrect
                };
                let likelihood = floor_probability(likelihood);
                if likelihood.is_nan() {
                    return Err(ProtQuantError::NanLikelihood {
                        feature: f,
                        sample: s,
                    });
                }
                *lp += likelihood.ln();
            }
        }

        let posterior = DiscretizedDistribution::from_log_masses(candidates.to_vec(), log_posterior)?;
        point_estimates.push(posterior.linear_expectation());
        posteriors.push(posterior);
    }

    Ok(SampleEstimates {
        posteriors,
        point_estimates,
    })
}
