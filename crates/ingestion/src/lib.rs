//! Bar ingestion and normalization for the forecast pipeline.
//!
//! This crate handles:
//! - Raw bar file envelopes and per-source row mapping (MOEX, BINANCE, generic)
//! - Row validation and numeric coercion
//! - Deduplication and time ordering
//! - Gap filling on a known sampling interval

pub mod normalizer;
pub mod source;

pub use normalizer::{BarNormalizer, NormalizeReport, NormalizedBars, SourceHint};
pub use source::{RawBarFile, RawRow, Source};
