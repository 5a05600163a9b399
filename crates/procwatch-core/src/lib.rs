//! procwatch-core - process sampling and scoring pipeline.
//!
//! Provides:
//! - `collector` - `/proc` backed metric source, filesystem seam and mocks
//! - `history` - bounded rolling histories (per metric, per process)
//! - `sampler` - background process and system samplers, durable behavior log
//! - `scoring` - categorizer, anomaly detector and lifetime predictor, each
//!   model-backed with a closed-form fallback
//! - `config` - service configuration
//! - `service` - the `Monitor` service object consumed by front-ends

pub mod collector;
pub mod config;
pub mod history;
pub mod sampler;
pub mod scoring;
pub mod service;

pub use config::MonitorConfig;
pub use service::{LookupError, Monitor, ProcessDetail, ScoredProcess, parse_pid};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
