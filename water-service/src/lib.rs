pub mod api;
pub mod config;
pub mod loader;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod session;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
