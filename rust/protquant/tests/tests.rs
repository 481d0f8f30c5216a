use protquant::hyperparameters::{
    GridConfig,
    HyperparameterConfig,
    Hyperparameters,
    MarginalizationConfig,
};
use protquant::models::{
    DiscretizedDistribution,
    QuantMatrix,
    QuantRow,
    SampleGroup,
    SampleGroups,
};
use protquant::posterior::sample::sample_posteriors;
use protquant::posterior::{
    ProteinPosteriors,
    get_posteriors,
};

const NAN: f64 = f64::NAN;

fn coarse_config() -> HyperparameterConfig {
    HyperparameterConfig {
        grid: GridConfig {
            min: -2.0,
            max: 2.0,
            step: 0.05,
        },
        ..Default::default()
    }
}

fn groups(sizes: &[usize]) -> SampleGroups {
    let mut start = 0;
    let groups = sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            let g = SampleGroup {
                label: format!("group{}", i),
                samples: (start..start + n).collect(),
            };
            start += n;
            g
        })
        .collect();
    SampleGroups::new(groups).unwrap()
}

fn rows(data: &[&[f64]], ident_pep: f64) -> Vec<QuantRow> {
    data.iter()
        .enumerate()
        .map(|(i, r)| {
            let n = r.len();
            QuantRow::new(format!("PEPTIDE{}", i), r.to_vec(), vec![ident_pep; n], vec![0.0; n])
                .unwrap()
        })
        .collect()
}

fn assert_normalized(dist: &DiscretizedDistribution) {
    assert!(dist.masses().iter().all(|p| *p >= 0.0));
    let total: f64 = dist.masses().iter().sum();
    assert!((total - 1.0).abs() < 1e-9, "sums to {}", total);
}

fn assert_all_normalized(out: &ProteinPosteriors) {
    out.sample_posteriors.iter().for_each(assert_normalized);
    out.group_posteriors.iter().for_each(assert_normalized);
    out.pair_results
        .iter()
        .for_each(|r| assert_normalized(&r.difference));
}

#[test]
fn test_identical_samples_show_no_change() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[1, 1])).unwrap();
    let rows = rows(&[&[1e6, 1e6], &[3e5, 3e5], &[2e7, 2e7]], 0.0);
    let out = get_posteriors(&rows, &params).unwrap();

    assert_all_normalized(&out);
    assert!(out.converged);
    let pair = out.pair(0, 1).unwrap();
    assert!(pair.log2_fold_change.abs() < 1e-6, "{}", pair.log2_fold_change);
    assert!(pair.prob_below_fold_change > 0.95, "{}", pair.prob_below_fold_change);
    for r in out.reference_levels.iter() {
        assert!((r - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_single_feature_equal_intensities() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[1, 1])).unwrap();
    let rows = rows(&[&[1e6, 1e6]], 0.0);
    let out = get_posteriors(&rows, &params).unwrap();

    assert_all_normalized(&out);
    let pair = out.pair(0, 1).unwrap();
    assert!(pair.log2_fold_change.abs() < 1e-9, "{}", pair.log2_fold_change);
    assert!(pair.prob_below_fold_change > 0.95, "{}", pair.prob_below_fold_change);
}

#[test]
fn test_single_feature_missing_in_second_sample() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[1, 1])).unwrap();
    let rows = rows(&[&[1e7, NAN]], 0.0);
    let out = get_posteriors(&rows, &params).unwrap();

    assert_all_normalized(&out);
    assert!(out.group_posteriors[1].expectation() < out.group_posteriors[0].expectation());
    // Its only observer has nothing to be imputed from, so sample 0 keeps the prior
    for (p, q) in out.sample_posteriors[0]
        .masses()
        .iter()
        .zip(params.prior().iter())
    {
        assert!((p - q).abs() < 1e-12);
    }
    assert!(out.pair(0, 1).unwrap().log2_fold_change > 0.0);
}

#[test]
fn test_missing_in_one_group_lowers_its_estimate() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[2, 2])).unwrap();
    let rows = rows(&[&[1e5, 1.1e5, NAN, NAN], &[2e5, 1.9e5, NAN, NAN]], 0.01);
    let out = get_posteriors(&rows, &params).unwrap();

    assert_all_normalized(&out);
    assert!(out.group_posteriors[1].expectation() < out.group_posteriors[0].expectation());
    assert!(out.pair(0, 1).unwrap().log2_fold_change > 0.0);
    for missing in [2, 3] {
        for observed in [0, 1] {
            assert!(out.reference_levels[missing] < out.reference_levels[observed]);
        }
    }
}

#[test]
fn test_wider_noise_gives_wider_posteriors() {
    let data = rows(&[&[1e6, 1e6], &[3e5, 3e5], &[2e7, 2e7]], 0.0);
    let matrix = QuantMatrix::from_rows(&data).unwrap();
    let posterior_with_noise = |sigma: f64| {
        let config = HyperparameterConfig {
            sigma_feature_diff: sigma,
            ..coarse_config()
        };
        let params = Hyperparameters::from_config(&config, groups(&[1, 1])).unwrap();
        sample_posteriors(&matrix, &data, &[1.0, 1.0], &params)
            .unwrap()
            .posteriors
            .remove(0)
    };
    let narrow = posterior_with_noise(0.1);
    let wide = posterior_with_noise(0.3);
    assert!(wide.std_dev() > narrow.std_dev());
    assert!((wide.mode_value() - narrow.mode_value()).abs() <= 0.05 + 1e-9);
}

#[test]
fn test_repeat_runs_are_identical() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[2, 2])).unwrap();
    let rows = rows(
        &[&[1e6, NAN, 3e6, 2.5e6], &[4e5, 5e5, NAN, 1e6], &[NAN, 2e4, 8e4, 9e4]],
        0.05,
    );
    let first = get_posteriors(&rows, &params).unwrap();
    let second = get_posteriors(&rows, &params).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_reference_levels_have_unit_geometric_mean() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[2, 3])).unwrap();
    let rows = rows(
        &[
            &[1e6, 1.2e6, 3e6, 2.5e6, 2.8e6],
            &[4e5, 5e5, NAN, 1e6, 1.1e6],
            &[NAN, 2e4, 8e4, 9e4, 7e4],
        ],
        0.02,
    );
    let out = get_posteriors(&rows, &params).unwrap();
    assert_all_normalized(&out);
    let mean_log: f64 = out.reference_levels.iter().map(|x| x.log10()).sum::<f64>()
        / out.reference_levels.len() as f64;
    assert!(mean_log.abs() < 1e-9);
    // group0 vs group1
    assert!(out.pair(0, 1).unwrap().log2_fold_change < 0.0);
}

#[test]
fn test_iteration_cap_is_respected() {
    let config = HyperparameterConfig {
        max_iterations: 2,
        ..coarse_config()
    };
    let params = Hyperparameters::from_config(&config, groups(&[2, 2])).unwrap();
    let rows = rows(&[&[1e5, 1.1e5, NAN, NAN], &[2e5, 1.9e5, NAN, 4e4]], 0.01);
    let out = get_posteriors(&rows, &params).unwrap();
    assert!(out.iterations >= 1 && out.iterations <= 2);
    if !out.converged {
        assert_eq!(out.iterations, 2);
    }
    assert_all_normalized(&out);
}

#[test]
fn test_all_missing_feature_changes_nothing() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[2, 2])).unwrap();
    let base: &[&[f64]] = &[&[1e6, NAN, 3e6, 2.5e6], &[4e5, 5e5, NAN, 1e6]];
    let with_empty: &[&[f64]] = &[
        &[1e6, NAN, 3e6, 2.5e6],
        &[NAN, NAN, NAN, NAN],
        &[4e5, 5e5, NAN, 1e6],
    ];
    let a = get_posteriors(&rows(base, 0.01), &params).unwrap();
    let b = get_posteriors(&rows(with_empty, 0.01), &params).unwrap();
    assert_eq!(a.iterations, b.iterations);
    for (x, y) in a.reference_levels.iter().zip(b.reference_levels.iter()) {
        assert!((x - y).abs() < 1e-12);
    }
    for (x, y) in a.sample_posteriors.iter().zip(b.sample_posteriors.iter()) {
        for (p, q) in x.masses().iter().zip(y.masses().iter()) {
            assert!((p - q).abs() < 1e-12);
        }
    }
}

#[test]
fn test_feature_seen_in_a_single_sample_is_tolerated() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[1, 1, 1])).unwrap();
    let rows = rows(&[&[1e6, NAN, NAN], &[5e5, 6e5, 4e5]], 0.01);
    let out = get_posteriors(&rows, &params).unwrap();
    assert_all_normalized(&out);
    assert_eq!(out.pair_results.len(), 3);
    let pairs: Vec<_> = out.pair_results.iter().map(|r| r.groups).collect();
    assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
}

#[test]
fn test_marginalized_in_group_variance() {
    let config = HyperparameterConfig {
        in_group_marginalization: Some(MarginalizationConfig {
            num_sigma_candidates: 10,
            ..Default::default()
        }),
        ..coarse_config()
    };
    let params = Hyperparameters::from_config(&config, groups(&[2, 2])).unwrap();
    let rows = rows(
        &[&[1e6, 1.1e6, 1e7, 1.2e7], &[2e5, 2.1e5, 2e6, 1.9e6]],
        0.01,
    );
    let out = get_posteriors(&rows, &params).unwrap();
    assert_all_normalized(&out);
    let pair = out.pair(0, 1).unwrap();
    assert!(pair.log2_fold_change < -1.0, "{}", pair.log2_fold_change);
    assert!(pair.prob_below_fold_change < 0.5);
}

#[test]
fn test_sample_count_mismatch_is_an_error() {
    let params = Hyperparameters::from_config(&coarse_config(), groups(&[2, 2])).unwrap();
    let rows = rows(&[&[1e6, 1e6, 1e6]], 0.01);
    assert!(get_posteriors(&rows, &params).is_err());
}
