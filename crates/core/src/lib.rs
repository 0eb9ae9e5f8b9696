//! Core types and configuration for the forecast pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Canonical bars and target definitions
//! - Configuration structures
//! - Common error types
//! - All-or-nothing artifact output

pub mod config;
pub mod error;
pub mod io;
pub mod types;

pub use config::{FeatureStrategyKind, PipelineConfig, TargetShape};
pub use error::{Error, Result};
pub use types::*;
