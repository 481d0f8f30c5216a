use ndarray::Array2;
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    DataProcessingError,
    ProtQuantError,
    Result,
};

/// One quantified peptide feature of a protein, across all samples.
///
/// `intensities` uses NaN for "not quantified in this sample".
/// An `identification_peps` entry of 1.0 means the feature carries no usable
/// identification in that sample and is left out of its likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantRow {
    pub feature_id: String,
    pub intensities: Vec<f64>,
    pub identification_peps: Vec<f64>,
    pub link_peps: Vec<f64>,
}

impl QuantRow {
    pub fn new(
        feature_id: impl Into<String>,
        intensities: Vec<f64>,
        identification_peps: Vec<f64>,
        link_peps: Vec<f64>,
    ) -> Result<Self> {
        let out = Self {
            feature_id: feature_id.into(),
            intensities,
            identification_peps,
            link_peps,
        };
        out.validate(out.intensities.len())?;
        Ok(out)
    }

    pub fn num_samples(&self) -> usize {
        self.intensities.len()
    }

    pub fn identification_pep(&self, sample: usize) -> f64 {
        self.identification_peps[sample]
    }

    pub fn link_pep(&self, sample: usize) -> f64 {
        self.link_peps[sample]
    }

    pub(crate) fn validate(&self, num_samples: usize) -> Result<()> {
        for (name, values) in [
            ("intensities", &self.intensities),
            ("identification_peps", &self.identification_peps),
            ("link_peps", &self.link_peps),
        ] {
            if values.len() != num_samples {
                return Err(DataProcessingError::ExpectedSlicesSameLength {
                    expected: num_samples,
                    other: values.len(),
                    context: format!("{} of feature {}", name, self.feature_id),
                }
                .into());
            }
        }
        for &pep in self.identification_peps.iter().chain(self.link_peps.iter()) {
            if !(0.0..=1.0).contains(&pep) {
                return Err(DataProcessingError::ExpectedProbability {
                    value: pep,
                    context: format!("PEP of feature {}", self.feature_id),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[inline]
pub(crate) fn is_observed(intensity: f64) -> bool {
    intensity.is_finite() && intensity > 0.0
}

/// Features x samples intensity matrix of a single protein.
///
/// Anything that is not a finite, positive intensity is stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantMatrix {
    intensities: Array2<f64>,
}

impl QuantMatrix {
    /// Builds the matrix for one protein, validating that every row has one
    /// entry per sample and PEPs within [0, 1].
    ///
    /// ```
    /// use protquant::models::{QuantMatrix, QuantRow};
    ///
    /// let rows = vec![
    ///     QuantRow::new("PEPTIDEK", vec![1e5, f64::NAN], vec![0.01, 0.01], vec![0.0, 0.2]).unwrap(),
    /// ];
    /// let matrix = QuantMatrix::from_rows(&rows).unwrap();
    /// assert_eq!(matrix.num_features(), 1);
    /// assert_eq!(matrix.num_samples(), 2);
    /// assert!(matrix.is_observed(0, 0));
    /// assert!(!matrix.is_observed(0, 1));
    /// ```
    pub fn from_rows(rows: &[QuantRow]) -> Result<Self> {
        let first = rows.first().ok_or(DataProcessingError::ExpectedNonEmptyData {
            context: Some("protein without quant rows".to_string()),
        })?;
        let num_samples = first.num_samples();
        if num_samples == 0 {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("quant rows without samples".to_string()),
            }
            .into());
        }

        let mut intensities = Array2::from_elem((rows.len(), num_samples), f64::NAN);
        for (f, row) in rows.iter().enumerate() {
            row.validate(num_samples)
                .map_err(|e| with_feature_context(e, f))?;
            for (s, &x) in row.intensities.iter().enumerate() {
                if is_observed(x) {
                    intensities[[f, s]] = x;
                }
            }
        }
        Ok(Self { intensities })
    }

    pub fn num_features(&self) -> usize {
        self.intensities.nrows()
    }

    pub fn num_samples(&self) -> usize {
        self.intensities.ncols()
    }

    pub fn intensity(&self, feature: usize, sample: usize) -> f64 {
        self.intensities[[feature, sample]]
    }

    pub fn is_observed(&self, feature: usize, sample: usize) -> bool {
        !self.intensities[[feature, sample]].is_nan()
    }

    /// log10 of every intensity, NaN where missing.
    pub fn log10_intensities(&self) -> Array2<f64> {
        self.intensities.mapv(f64::log10)
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.intensities
    }
}

fn with_feature_context(e: ProtQuantError, feature: usize) -> ProtQuantError {
    match e {
        ProtQuantError::DataProcessing(inner) => inner
            .append_to_context(&format!(" (row {})", feature))
            .into(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_intensities_become_missing() {
        let rows = vec![
            QuantRow::new("a", vec![0.0, -3.0, f64::INFINITY, 10.0], vec![0.0; 4], vec![0.0; 4])
                .unwrap(),
        ];
        let m = QuantMatrix::from_rows(&rows).unwrap();
        assert!(!m.is_observed(0, 0));
        assert!(!m.is_observed(0, 1));
        assert!(!m.is_observed(0, 2));
        assert!(m.is_observed(0, 3));
        assert_eq!(m.log10_intensities()[[0, 3]], 1.0);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let rows = vec![
            QuantRow::new("a", vec![1.0, 2.0], vec![0.0; 2], vec![0.0; 2]).unwrap(),
            QuantRow::new("b", vec![1.0, 2.0, 3.0], vec![0.0; 3], vec![0.0; 3]).unwrap(),
        ];
        let err = QuantMatrix::from_rows(&rows).unwrap_err();
        match err {
            ProtQuantError::DataProcessing(DataProcessingError::ExpectedSlicesSameLength {
                context,
                ..
            }) => assert!(context.contains("row 1"), "{}", context),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_peps() {
        assert!(QuantRow::new("a", vec![1.0], vec![1.5], vec![0.0]).is_err());
        assert!(QuantRow::new("a", vec![1.0], vec![0.5], vec![-0.1]).is_err());
        assert!(QuantRow::new("a", vec![1.0], vec![f64::NAN], vec![0.0]).is_err());
        assert!(QuantRow::new("a", vec![1.0], vec![0.5, 0.5], vec![0.0]).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(QuantMatrix::from_rows(&[]).is_err());
    }
}
