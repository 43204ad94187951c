pub mod config;
pub mod driver;
pub mod metrics_server;
pub mod observability;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use driver::{Driver, RunError, RunSummary};
