//! # strata-server
//!
//! Background services for strata.
//!
//! This crate provides:
//! - The journal garbage collector thread with start/stop handles
//! - Collector statistics and per-tick reports
//! - YAML and environment configuration

pub mod config;
pub mod error;
pub mod gc;

pub use config::{
    BackendKind, CollectionConfig, Config, ConfigError, GcConfig, StorageConfig,
};
pub use error::ServerError;
pub use gc::{
    run_tick, start_garbage_collector, stop_garbage_collector, GcCounters, GcHandle, GcStats,
    TickReport,
};
