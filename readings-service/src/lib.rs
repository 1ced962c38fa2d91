pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod store;

pub use pipeline::{Envelope, Pipeline, Submission};
