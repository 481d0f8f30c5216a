use protquant::models::QuantRow;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{
    debug,
    info,
    warn,
};

use crate::config::SampleLayout;
use crate::errors::CliError;

/// One line of the long-format quantification table.
#[derive(Debug, Clone, Deserialize)]
struct QuantRecord {
    protein: String,
    feature: String,
    sample: String,
    /// Empty, zero or NaN means "not quantified". Anything else that is not
    /// a number is an error.
    intensity: Option<f64>,
    ident_pep: f64,
    #[serde(default)]
    link_pep: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    intensity: f64,
    ident_pep: f64,
    link_pep: f64,
}

impl Cell {
    fn is_observed(&self) -> bool {
        self.intensity.is_finite() && self.intensity > 0.0
    }
}

/// All the features of one protein, ready for inference.
#[derive(Debug, Clone)]
pub struct ProteinInput {
    pub protein: String,
    pub rows: Vec<QuantRow>,
}

type FeatureCells = Vec<Option<Cell>>;

pub fn read_quant_file<T: AsRef<Path>>(
    file: T,
    layout: &SampleLayout,
) -> Result<Vec<ProteinInput>, CliError> {
    let handle = std::fs::File::open(file.as_ref()).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(file.as_ref().display().to_string()),
    })?;
    info!("Reading quantification table from {}", file.as_ref().display());
    read_quant_table(handle, layout)
}

/// Parses a tab-separated table with the columns
/// `protein, feature, sample, intensity, ident_pep[, link_pep]`.
///
/// Proteins and their features come out in lexicographic order. Samples not
/// listed in `layout` are dropped.
pub fn read_quant_table<R: Read>(
    reader: R,
    layout: &SampleLayout,
) -> Result<Vec<ProteinInput>, CliError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let num_samples = layout.names.len();
    let mut proteins: BTreeMap<String, BTreeMap<String, FeatureCells>> = BTreeMap::new();
    let mut num_records = 0;
    let mut num_unknown_sample = 0;
    let mut num_duplicates = 0;

    for result in rdr.deserialize() {
        let record: QuantRecord = result?;
        num_records += 1;
        let Some(&sample) = layout.index.get(&record.sample) else {
            num_unknown_sample += 1;
            continue;
        };
        for (name, pep) in [("ident_pep", record.ident_pep), ("link_pep", record.link_pep)] {
            if !(0.0..=1.0).contains(&pep) {
                return Err(CliError::DataReading {
                    source: format!(
                        "{} of {} for feature {} in sample {} is not a probability",
                        name, pep, record.feature, record.sample
                    ),
                });
            }
        }

        let cells = proteins
            .entry(record.protein)
            .or_default()
            .entry(record.feature)
            .or_insert_with(|| vec![None; num_samples]);
        let cell = Cell {
            intensity: record.intensity.unwrap_or(f64::NAN),
            ident_pep: record.ident_pep,
            link_pep: record.link_pep,
        };
        match &mut cells[sample] {
            Some(existing) => {
                num_duplicates += 1;
                if cell.ident_pep < existing.ident_pep {
                    *existing = cell;
                }
            }
            empty => *empty = Some(cell),
        }
    }

    if num_unknown_sample > 0 {
        warn!(
            "Dropped {} rows whose sample is not part of any group",
            num_unknown_sample
        );
    }
    if num_duplicates > 0 {
        debug!(
            "Kept the best identification for {} duplicated rows",
            num_duplicates
        );
    }

    let out: Vec<ProteinInput> = proteins
        .into_iter()
        .map(|(protein, features)| {
            let rows = features
                .into_iter()
                .map(|(feature, cells)| build_row(feature, &cells))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ProteinInput { protein, rows })
        })
        .collect::<Result<_, CliError>>()?;
    info!(
        "Read {} rows into {} proteins",
        num_records,
        out.len()
    );
    Ok(out)
}

/// Fills samples the feature is absent from with a missing intensity that
/// keeps the feature's best identification.
fn build_row(feature: String, cells: &[Option<Cell>]) -> Result<QuantRow, CliError> {
    let best_observed = cells
        .iter()
        .flatten()
        .filter(|c| c.is_observed())
        .map(|c| c.ident_pep)
        .fold(f64::INFINITY, f64::min);
    let best_pep = if best_observed.is_finite() {
        best_observed
    } else {
        cells
            .iter()
            .flatten()
            .map(|c| c.ident_pep)
            .fold(1.0, f64::min)
    };

    let mut intensities = Vec::with_capacity(cells.len());
    let mut ident_peps = Vec::with_capacity(cells.len());
    let mut link_peps = Vec::with_capacity(cells.len());
    for cell in cells.iter() {
        let cell = cell.unwrap_or(Cell {
            intensity: f64::NAN,
            ident_pep: best_pep,
            link_pep: 0.0,
        });
        intensities.push(cell.intensity);
        ident_peps.push(cell.ident_pep);
        link_peps.push(cell.link_pep);
    }
    QuantRow::new(feature, intensities, ident_peps, link_peps).map_err(|e| CliError::DataReading {
        source: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AnalysisConfig,
        GroupConfig,
    };

    fn layout() -> SampleLayout {
        AnalysisConfig {
            groups: vec![
                GroupConfig {
                    label: "a".into(),
                    samples: vec!["s1".into(), "s2".into()],
                },
                GroupConfig {
                    label: "b".into(),
                    samples: vec!["s3".into()],
                },
            ],
            hyperparameters: Default::default(),
        }
        .sample_layout()
        .unwrap()
    }

    const TABLE: &str = "protein\tfeature\tsample\tintensity\tident_pep\tlink_pep
P1\tPEPTIDEK\ts1\t1000\t0.01\t0.0
P1\tPEPTIDEK\ts2\t1200\t0.05\t0.1
P1\tPEPTIDEK\ts3\t\t0.2\t0.0
P1\tOTHERK\ts3\t500\t0.02\t0.0
P0\tANOTHERK\ts1\t700\t0.03\t0.0
P0\tANOTHERK\ts1\t900\t0.001\t0.0
P0\tANOTHERK\tunknown\t900\t0.001\t0.0
";

    #[test]
    fn test_read_table() {
        let proteins = read_quant_table(TABLE.as_bytes(), &layout()).unwrap();
        assert_eq!(proteins.len(), 2);
        assert_eq!(proteins[0].protein, "P0");
        assert_eq!(proteins[1].protein, "P1");

        // Duplicates keep the best identification
        let p0 = &proteins[0].rows[0];
        assert_eq!(p0.intensities[0], 900.0);
        assert_eq!(p0.identification_peps[0], 0.001);

        let p1 = &proteins[1];
        assert_eq!(p1.rows.len(), 2);
        // Features sorted by name
        assert_eq!(p1.rows[0].feature_id, "OTHERK");
        let other = &p1.rows[0];
        assert!(other.intensities[0].is_nan());
        assert_eq!(other.identification_peps, vec![0.02, 0.02, 0.02]);
        assert_eq!(other.link_peps, vec![0.0, 0.0, 0.0]);

        let peptide = &p1.rows[1];
        assert_eq!(peptide.intensities[..2], [1000.0, 1200.0]);
        assert!(peptide.intensities[2].is_nan());
        // An explicit row keeps its own PEPs even when not quantified
        assert_eq!(peptide.identification_peps, vec![0.01, 0.05, 0.2]);
        assert_eq!(peptide.link_peps, vec![0.0, 0.1, 0.0]);
    }

    #[test]
    fn test_rejects_bad_pep() {
        let table = "protein\tfeature\tsample\tintensity\tident_pep\tlink_pep\nP\tF\ts1\t10\t1.5\t0\n";
        assert!(matches!(
            read_quant_table(table.as_bytes(), &layout()),
            Err(CliError::DataReading { .. })
        ));
    }

    #[test]
    fn test_missing_link_pep_column() {
        let table = "protein\tfeature\tsample\tintensity\tident_pep\nP\tF\ts2\t10\t0.1\n";
        let proteins = read_quant_table(table.as_bytes(), &layout()).unwrap();
        assert_eq!(proteins[0].rows[0].link_peps, vec![0.0, 0.0, 0.0]);
        assert_eq!(proteins[0].rows[0].identification_peps, vec![0.1, 0.1, 0.1]);
    }

    #[test]
    fn test_rejects_unparseable_intensity() {
        let table = "protein\tfeature\tsample\tintensity\tident_pep\nP\tF\ts1\tabc\t0.1\n";
        assert!(read_quant_table(table.as_bytes(), &layout()).is_err());
    }

    #[test]
    fn test_nan_and_zero_intensities_are_missing() {
        let table = "protein\tfeature\tsample\tintensity\tident_pep\nP\tF\ts1\tNaN\t0.1\nP\tF\ts2\t0\t0.1\nP\tF\ts3\t50\t0.1\n";
        let proteins = read_quant_table(table.as_bytes(), &layout()).unwrap();
        let row = &proteins[0].rows[0];
        assert!(row.intensities[0].is_nan());
        assert!(row.intensities[1].is_nan());
        assert_eq!(row.intensities[2], 50.0);
    }
}
