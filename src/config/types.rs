//! Configuration types for criteria and preflight descriptors
//!
//! These mirror the JSON documents produced by the assignment authoring
//! layer. Schema validation happens upstream; the types here are permissive
//! and the tree builder enforces the structural invariants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level criteria document (`criteria.json`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CriteriaConfig {
    pub base: Option<CategoryConfig>,
    pub bonus: Option<CategoryConfig>,
    pub penalty: Option<CategoryConfig>,
}

/// One category entry (`base`, `bonus`, or `penalty`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CategoryConfig {
    /// Maximum score this category contributes (0-100)
    pub weight: Option<u32>,
    pub subjects: Option<SubjectsConfig>,
    pub tests: Option<Vec<TestConfig>>,
    pub subjects_weight: Option<u32>,
}

/// Subject descriptor, usable in both list and map form
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubjectConfig {
    /// Subject name; in map form the key supplies it instead
    pub name: Option<String>,
    pub weight: Option<u32>,
    pub subjects: Option<SubjectsConfig>,
    pub tests: Option<Vec<TestConfig>>,
    pub subjects_weight: Option<u32>,
}

/// Sibling subjects, accepted as an ordered array of named descriptors or
/// as a map of name -> descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SubjectsConfig {
    List(Vec<SubjectConfig>),
    Map(BTreeMap<String, SubjectConfig>),
}

impl SubjectsConfig {
    /// Iterate entries as (map key if any, descriptor) pairs.
    pub fn entries(&self) -> Vec<(Option<&str>, &SubjectConfig)> {
        match self {
            SubjectsConfig::List(list) => list.iter().map(|s| (None, s)).collect(),
            SubjectsConfig::Map(map) => {
                map.iter().map(|(name, s)| (Some(name.as_str()), s)).collect()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SubjectsConfig::List(list) => list.is_empty(),
            SubjectsConfig::Map(map) => map.is_empty(),
        }
    }
}

/// A test entry: a bare name, or a descriptor with an explicit call list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TestConfig {
    Name(String),
    Detailed(TestDescriptor),
}

/// Structured test descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestDescriptor {
    pub name: String,
    /// Submission file this check targets, if any
    pub file: Option<String>,
    /// One argument list per concrete invocation, in input order
    pub calls: Option<Vec<Vec<Value>>>,
}

/// Preflight descriptor (`autograder-setup.json`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SetupConfig {
    /// Glob patterns that must match at least one submission file
    #[serde(default)]
    pub file_checks: Vec<String>,
    /// Named commands executed before any test runs
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

impl SetupConfig {
    pub fn is_empty(&self) -> bool {
        self.file_checks.is_empty() && self.commands.is_empty()
    }
}

/// One preflight command
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandSpec {
    /// Shell-style command line, split with shlex before spawning
    pub command: String,
    /// Human-readable label used in error reports
    pub name: String,
    /// Detached long-lived process (e.g. a server) instead of a blocking step
    #[serde(default)]
    pub background: bool,
}
