use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    ExpectedProbability {
        value: f64,
        context: String,
    },
    ExpectedFiniteNonNanData {
        context: String,
    },
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::ExpectedProbability {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedFiniteNonNanData {
                context: owned_context,
            } => {
                owned_context.push_str(context);
            }
        }
        self
    }
}

impl Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedSlicesSameLength {
                expected,
                other,
                context,
            } => write!(
                f,
                "Expected length {} but got {} ({})",
                expected, other, context
            ),
            Self::ExpectedNonEmptyData { context } => match context {
                Some(context) => write!(f, "Expected non-empty data ({})", context),
                None => write!(f, "Expected non-empty data"),
            },
            Self::ExpectedProbability { value, context } => {
                write!(f, "Expected a probability in [0, 1], got {} ({})", value, context)
            }
            Self::ExpectedFiniteNonNanData { context } => {
                write!(f, "Expected finite, non-NaN data ({})", context)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtQuantError {
    DataProcessing(DataProcessingError),
    Config {
        msg: String,
    },
    /// A likelihood term evaluated to NaN even after flooring.
    /// Means the input rows or the hyperparameters are corrupted.
    NanLikelihood {
        feature: usize,
        sample: usize,
    },
}

impl ProtQuantError {
    pub fn config(msg: impl Display) -> Self {
        Self::Config {
            msg: msg.to_string(),
        }
    }
}

impl Display for ProtQuantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataProcessing(e) => write!(f, "Error processing quant data: {}", e),
            Self::Config { msg } => write!(f, "Invalid hyperparameters: {}", msg),
            Self::NanLikelihood { feature, sample } => write!(
                f,
                "NaN encountered in likelihood computation for feature {} in sample {}",
                feature, sample
            ),
        }
    }
}

impl std::error::Error for ProtQuantError {}

pub type Result<T> = std::result::Result<T, ProtQuantError>;

impl From<DataProcessingError> for ProtQuantError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}
