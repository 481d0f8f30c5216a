pub mod errors;
pub mod hyperparameters;
pub mod imputation;
pub mod models;
pub mod posterior;
pub mod probability;
pub mod significance;

pub use errors::{
    ProtQuantError,
    Result,
};
pub use hyperparameters::{
    HyperparameterConfig,
    Hyperparameters,
};
pub use models::{
    DiscretizedDistribution,
    QuantRow,
    SampleGroup,
    SampleGroups,
};
pub use posterior::{
    GroupPairResult,
    ProteinPosteriors,
    get_posteriors,
};
