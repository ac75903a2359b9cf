//! Consumer side: subscribe to rollups and keep the latest one

pub mod cache;
pub mod subscribe;

pub use cache::{LatestCache, LatestRollup};
pub use subscribe::{SubscribeLoop, SubscribeStats};
