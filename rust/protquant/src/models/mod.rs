pub mod distribution;
pub mod groups;
pub mod quant_row;

pub use distribution::DiscretizedDistribution;
pub use groups::{
    SampleGroup,
    SampleGroups,
};
pub use quant_row::{
    QuantMatrix,
    QuantRow,
};
