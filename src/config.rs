//! Configuration loading for rubric-core
//!
//! Two JSON documents drive a grading run: `criteria.json` (the weighted
//! check tree) and `autograder-setup.json` (preflight checks and commands).
//! Both are placed next to the submission by the request layer.

pub mod types;

use std::fs;
use std::path::Path;

use crate::error::Result;

pub use types::{
    CategoryConfig, CommandSpec, CriteriaConfig, SetupConfig, SubjectConfig, SubjectsConfig,
    TestConfig, TestDescriptor,
};

/// File name of the criteria document
pub const CRITERIA_FILE: &str = "criteria.json";

/// File name of the preflight descriptor
pub const SETUP_FILE: &str = "autograder-setup.json";

impl CriteriaConfig {
    /// Load a criteria document from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CriteriaConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}

impl SetupConfig {
    /// Load a preflight descriptor from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SetupConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}
