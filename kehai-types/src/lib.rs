//! Shared data model and configuration primitives for the kehai workspace.
#![warn(missing_docs)]

mod config;
mod data_type;
mod error;
mod quote;

pub use config::{
    AlertConfig, BackoffConfig, BlacklistConfig, CacheTtlConfig, DispatchConfig, KehaiConfig,
    PrewarmConfig, RateLimitConfig, RateLimitOverride, ReorderConfig, RetryConfig, ValidatorConfig,
};
pub use data_type::DataType;
pub use error::{ErrorKind, KehaiError};
pub use quote::{CACHE_SOURCE, DEFAULT_SOURCE, Quote, iso_millis};
