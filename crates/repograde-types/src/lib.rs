//! Shared types for repograde.
//!
//! Design goal: versioned, explicit, boring.
//! These structs are what suites, scores, gate reports and confidence summaries look like
//! once they leave the component that produced them.

mod confidence;
mod gate;
mod score;
mod suite;
mod task;

pub use confidence::*;
pub use gate::*;
pub use score::*;
pub use suite::*;
pub use task::*;

pub const EVALUATION_SCHEMA_V1: &str = "repograde.evaluation.v1";
pub const BASELINE_SCHEMA_V1: &str = "repograde.baseline.v1";
pub const CONFIDENCE_SCHEMA_V1: &str = "repograde.confidence.v1";

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    pub fn current() -> Self {
        Self {
            name: "repograde".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
