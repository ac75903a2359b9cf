//! Rollups: Windowed Event-Type Counts over a Message Broker
//!
//! A producer polls the public GitHub events feed, counts events per type over
//! a sliding window and publishes a rollup snapshot to a broker topic after
//! every poll. A consumer reads the topic into a single-slot cache and serves
//! the newest rollup over HTTP.
//!
//! # Features
//!
//! - **Sliding Windows**: Per-label counts over one-second buckets
//! - **Rate-Limit Pacing**: Poll interval derived from the feed's quota headers
//! - **Broker Seams**: Kafka behind the `kafka` feature, in-memory log for tests
//! - **Query Endpoint**: `GET /rollups` returns the latest payload verbatim
//!
//! # Example
//!
//! ```no_run
//! use rollups::aggregate::{Aggregator, Label};
//!
//! let aggregator = Aggregator::new();
//! if let Some(label) = Label::new("PushEvent") {
//!     aggregator.observe(&label);
//! }
//!
//! let rollup = aggregator.snapshot();
//! println!("{}", String::from_utf8_lossy(&rollup.encode().unwrap()));
//! ```

pub mod aggregate;
pub mod api;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod feed;
pub mod producer;
pub mod rollup;
pub mod shutdown;

// Re-export commonly used types
pub use aggregate::{Aggregator, Label};
pub use config::{ConsumerConfig, ProducerConfig};
pub use rollup::{Metadata, Rollup, RollupError};
