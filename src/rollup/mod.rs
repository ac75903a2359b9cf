//! Rollup data model and its wire encoding

pub mod model;

pub use model::{format_duration, Metadata, Rollup, RollupError};
