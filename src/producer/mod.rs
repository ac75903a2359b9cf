//! Producer side: poll the feed, aggregate, publish

pub mod poll_loop;
pub mod publisher;

pub use poll_loop::{PollConfig, PollLoop, PollState, PollStats};
pub use publisher::{PublishError, Publisher};
