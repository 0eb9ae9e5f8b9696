//! Cross-runtime parity for exported forecast models.
//!
//! This crate handles:
//! - The scoring artifact seam and a portable linear artifact
//! - Tail selection from held-out canonical bars
//! - Golden test-vector manifests (build, persist, verify)
//! - SHA-256 sidecars for exported artifacts
//! - Split evaluation against a zero-delta baseline

pub mod artifacts;
pub mod evaluate;
pub mod harness;
pub mod manifest;
pub mod scorer;
pub mod tails;

pub use artifacts::{
    check_manifest, check_sidecar, ensure_sidecar, sha256_file, write_sidecar, ArtifactCheck,
};
pub use evaluate::evaluate_model;
pub use harness::{allclose, CaseReport, ParityHarness, VerifyReport};
pub use manifest::{manifest_path, write_manifest, ExpectedOutput, TestVectorCase, TestVectorManifest};
pub use scorer::{LinearScorer, Scorer};
pub use tails::pick_tails;
