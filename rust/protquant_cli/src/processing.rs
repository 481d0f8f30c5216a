use indicatif::{
    ParallelProgressIterator,
    ProgressStyle,
};
use protquant::models::SampleGroups;
use protquant::posterior::{
    ProteinPosteriors,
    get_posteriors,
};
use protquant::significance::{
    ScoredComparison,
    assign_posterior_qvalues,
};
use protquant::Hyperparameters;
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};

use crate::config::OutputConfig;
use crate::errors::CliError;
use crate::input::ProteinInput;

/// Successful inference for one protein.
#[derive(Debug, Clone)]
pub struct ProteinResult {
    pub protein: String,
    pub num_features: usize,
    pub posteriors: ProteinPosteriors,
}

/// Runs the inference for every protein in parallel.
///
/// Proteins that fail are logged and left out.
pub fn run_inference(proteins: &[ProteinInput], params: &Hyperparameters) -> Vec<ProteinResult> {
    let start = Instant::now();
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let results: Vec<Option<ProteinResult>> = proteins
        .par_iter()
        .progress_with_style(style)
        .map(|p| infer_protein(p, params))
        .collect();
    let results: Vec<ProteinResult> = results.into_iter().flatten().collect();

    let num_unconverged = results.iter().filter(|r| !r.posteriors.converged).count();
    if num_unconverged > 0 {
        warn!(
            "{} proteins hit the iteration cap before their reference levels converged",
            num_unconverged
        );
    }
    info!(
        "Inferred {}/{} proteins in {:?}",
        results.len(),
        proteins.len(),
        start.elapsed()
    );
    results
}

fn infer_protein(input: &ProteinInput, params: &Hyperparameters) -> Option<ProteinResult> {
    match get_posteriors(&input.rows, params) {
        Ok(posteriors) => {
            debug!(
                "Protein {}: {} iterations, converged: {}",
                input.protein, posteriors.iterations, posteriors.converged
            );
            Some(ProteinResult {
                protein: input.protein.clone(),
                num_features: input.rows.len(),
                posteriors,
            })
        }
        Err(e) => {
            warn!("Skipping protein {}: {}", input.protein, e);
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct ProteinComparisonRow<'a> {
    protein: &'a str,
    group_1: &'a str,
    group_2: &'a str,
    log2_fold_change: f64,
    log2_fold_change_sd: f64,
    prob_below_fold_change: f64,
    posterior_qvalue: f64,
    num_features: usize,
    group_1_log2_abundance: f64,
    group_2_log2_abundance: f64,
}

/// All group comparisons of all proteins, with posterior q-values, most
/// confident first.
pub fn scored_comparisons(results: &[ProteinResult]) -> Vec<ScoredComparison> {
    let mut comparisons: Vec<ScoredComparison> = results
        .iter()
        .flat_map(|r| ScoredComparison::from_posteriors(&r.protein, r.num_features, &r.posteriors))
        .collect();
    assign_posterior_qvalues(&mut comparisons);
    comparisons
}

pub fn write_comparisons<W: Write>(
    writer: W,
    comparisons: &[ScoredComparison],
    groups: &SampleGroups,
) -> Result<(), CliError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    let label = |i: usize| groups.get(i).map(|g| g.label.as_str()).unwrap_or("");
    for c in comparisons.iter() {
        wtr.serialize(ProteinComparisonRow {
            protein: &c.protein,
            group_1: label(c.groups.0),
            group_2: label(c.groups.1),
            log2_fold_change: c.log2_fold_change,
            log2_fold_change_sd: c.log2_fold_change_sd,
            prob_below_fold_change: c.prob_below_fold_change,
            posterior_qvalue: c.qval,
            num_features: c.num_features,
            group_1_log2_abundance: c.group_log2_abundances.0,
            group_2_log2_abundance: c.group_log2_abundances.1,
        })?;
    }
    wtr.flush().map_err(|e| CliError::Io {
        source: e.to_string(),
        path: None,
    })?;
    Ok(())
}

pub fn write_reference_levels<W: Write>(
    writer: W,
    results: &[ProteinResult],
    sample_names: &[String],
) -> Result<(), CliError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    wtr.write_record(std::iter::once("protein").chain(sample_names.iter().map(|s| s.as_str())))?;
    for r in results.iter() {
        let mut record = vec![r.protein.clone()];
        record.extend(r.posteriors.reference_levels.iter().map(|x| x.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush().map_err(|e| CliError::Io {
        source: e.to_string(),
        path: None,
    })?;
    Ok(())
}

fn create_file(path: &Path) -> Result<std::fs::File, CliError> {
    std::fs::File::create(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.display().to_string()),
    })
}

pub fn process_proteins(
    proteins: &[ProteinInput],
    params: &Hyperparameters,
    sample_names: &[String],
    output: &OutputConfig,
) -> Result<(), CliError> {
    let results = run_inference(proteins, params);
    let comparisons = scored_comparisons(&results);

    let proteins_path = output.directory.join("proteins.tsv");
    write_comparisons(create_file(&proteins_path)?, &comparisons, params.groups())?;
    info!(
        "Wrote {} comparisons to {}",
        comparisons.len(),
        proteins_path.display()
    );

    let levels_path = output.directory.join("reference_levels.tsv");
    write_reference_levels(create_file(&levels_path)?, &results, sample_names)?;
    info!("Wrote reference levels to {}", levels_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AnalysisConfig,
        GroupConfig,
    };
    use crate::input::read_quant_table;
    use protquant::hyperparameters::{
        GridConfig,
        HyperparameterConfig,
    };

    const TABLE: &str = "protein\tfeature\tsample\tintensity\tident_pep\tlink_pep
UP\tA\tc1\t100000\t0.01\t0
UP\tA\tc2\t110000\t0.01\t0
UP\tA\tt1\t1000000\t0.01\t0
UP\tA\tt2\t1200000\t0.01\t0
UP\tB\tc1\t20000\t0.01\t0
UP\tB\tc2\t21000\t0.01\t0
UP\tB\tt1\t200000\t0.01\t0
UP\tB\tt2\t190000\t0.01\t0
FLAT\tC\tc1\t500000\t0.01\t0
FLAT\tC\tc2\t510000\t0.01\t0
FLAT\tC\tt1\t490000\t0.01\t0
FLAT\tC\tt2\t505000\t0.01\t0
FLAT\tD\tc1\t300000\t0.01\t0
FLAT\tD\tc2\t290000\t0.01\t0
FLAT\tD\tt1\t310000\t0.01\t0
FLAT\tD\tt2\t300000\t0.01\t0
";

    fn setup() -> (Vec<ProteinInput>, Hyperparameters, Vec<String>) {
        let analysis = AnalysisConfig {
            groups: vec![
                GroupConfig {
                    label: "ctrl".into(),
                    samples: vec!["c1".into(), "c2".into()],
                },
                GroupConfig {
                    label: "treated".into(),
                    samples: vec!["t1".into(), "t2".into()],
                },
            ],
            hyperparameters: HyperparameterConfig {
                grid: GridConfig {
                    min: -2.0,
                    max: 2.0,
                    step: 0.05,
                },
                ..Default::default()
            },
        };
        let layout = analysis.sample_layout().unwrap();
        let params =
            Hyperparameters::from_config(&analysis.hyperparameters, layout.groups.clone()).unwrap();
        let proteins = read_quant_table(TABLE.as_bytes(), &layout).unwrap();
        (proteins, params, layout.names)
    }

    #[test]
    fn test_changed_protein_ranks_first() {
        let (proteins, params, _) = setup();
        let results = run_inference(&proteins, &params);
        assert_eq!(results.len(), 2);
        let comparisons = scored_comparisons(&results);
        assert_eq!(comparisons.len(), 2);
        assert_eq!(comparisons[0].protein, "UP");
        assert!(comparisons[0].log2_fold_change < -1.0);
        assert!(comparisons[0].qval <= comparisons[1].qval);
        assert!(comparisons[1].prob_below_fold_change > 0.5);
    }

    #[test]
    fn test_write_outputs() {
        let (proteins, params, names) = setup();
        let results = run_inference(&proteins, &params);
        let comparisons = scored_comparisons(&results);

        let mut buf = Vec::new();
        write_comparisons(&mut buf, &comparisons, params.groups()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "protein\tgroup_1\tgroup_2\tlog2_fold_change\tlog2_fold_change_sd\tprob_below_fold_change\tposterior_qvalue\tnum_features\tgroup_1_log2_abundance\tgroup_2_log2_abundance"
        );
        assert!(lines.next().unwrap().starts_with("UP\tctrl\ttreated\t"));

        let mut buf = Vec::new();
        write_reference_levels(&mut buf, &results, &names).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().next().unwrap(), "protein\tc1\tc2\tt1\tt2");
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_failing_protein_is_skipped() {
        let (mut proteins, params, _) = setup();
        // Wrong number of samples
        proteins.push(ProteinInput {
            protein: "BROKEN".into(),
            rows: vec![
                protquant::QuantRow::new("X", vec![1.0, 2.0], vec![0.0; 2], vec![0.0; 2]).unwrap(),
            ],
        });
        let results = run_inference(&proteins, &params);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.protein != "BROKEN"));
    }
}
