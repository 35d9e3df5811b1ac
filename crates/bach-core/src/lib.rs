pub mod actor;
pub mod batch;
pub mod config;
pub mod enricher;
pub mod error;
pub mod fetcher;
pub mod notifier;
pub mod params;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod report;
pub mod request;
pub mod rules;
pub mod store;
pub mod task;

pub use error::{BachError, Result};
pub use pipeline::{Bach, RunSummary, Stage};
pub use registry::PluginRegistry;
pub use request::BachRequest;
