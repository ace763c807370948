//! Repograde workspace-level test utilities.
//!
//! This crate exists solely to host workspace-level tests: the BDD scenarios in
//! `tests/cucumber.rs` (driven by `features/`) and the integration binary in
//! `tests/integration/`.
//!
//! The actual functionality lives in the member crates:
//! - `repograde-types`: data contracts and JSON schemas
//! - `repograde-config`: task and analysis configuration loading
//! - `repograde-metrics`: test-runner output parsing
//! - `repograde-adapters`: process supervision and synthetic load
//! - `repograde-domain`: scoring
//! - `repograde-gate`: static import checks
//! - `repograde-app`: evaluation, baselines and confidence analysis
//! - `repograde`: facade
