//! Configuration module for driftnet
//!
//! This module handles loading, parsing, and validating the TOML
//! configuration file and the JSON accounts file.
//!
//! # Example
//!
//! ```no_run
//! use driftnet::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawling {} keywords", config.job.keywords.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, JobConfig, OutputConfig, PoolConfig, ProviderConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_accounts, load_config, load_config_with_hash,
};
