//! Shared configuration, error types and identifiers for nexec crates.
//!
//! Architecture role:
//! - defines the converter configuration passed from the worker into the planner
//! - provides the common [`NexecError`] / [`Result`] contracts
//! - hosts typed identifiers for queries and plan nodes
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]

pub mod config;
pub mod error;
pub mod ids;

pub use config::ConverterConfig;
pub use error::{NexecError, Result};
pub use ids::*;
