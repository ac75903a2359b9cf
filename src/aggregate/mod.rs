//! Sliding-window aggregation of event-type counts

pub mod aggregator;
pub mod window;

pub use aggregator::{Aggregator, Label};
pub use window::{WindowedCount, DEFAULT_WINDOW};
