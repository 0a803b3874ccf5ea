//! Ambient plumbing shared by every pipeline stage.
//!
//! Configuration and the crate-wide error type live here.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{
    AggregationConfig, ClusterConfig, Config, ConfigBuilder, LogLevel, LoggingConfig, NodeConfig, RoleConfig,
};
pub use error::{MeterflowError, Result};
