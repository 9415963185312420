//! Criteria tree model
//!
//! The weighted hierarchy defining how a submission is scored:
//! Categories (`base`/`bonus`/`penalty`) hold Subjects and/or Tests; Tests
//! hold one or more TestCalls (concrete invocations). The tree is built once
//! per grading run from an immutable config snapshot, mutated only by
//! merging in normalized test records, read once by the score aggregator,
//! and discarded with the run.

pub mod builder;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::report::TestRecord;

pub use builder::parse_tree;

/// The three scoring categories, combined additively into the final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Base,
    Bonus,
    Penalty,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 3] =
        [CategoryKind::Base, CategoryKind::Bonus, CategoryKind::Penalty];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Base => "base",
            CategoryKind::Bonus => "bonus",
            CategoryKind::Penalty => "penalty",
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Root of the criteria tree; absent categories were not declared in config
/// and are excluded from aggregation
#[derive(Debug, Clone, Default, Serialize)]
pub struct CriteriaTree {
    pub base: Option<Category>,
    pub bonus: Option<Category>,
    pub penalty: Option<Category>,
}

impl CriteriaTree {
    pub fn get(&self, kind: CategoryKind) -> Option<&Category> {
        match kind {
            CategoryKind::Base => self.base.as_ref(),
            CategoryKind::Bonus => self.bonus.as_ref(),
            CategoryKind::Penalty => self.penalty.as_ref(),
        }
    }

    pub fn get_mut(&mut self, kind: CategoryKind) -> Option<&mut Category> {
        match kind {
            CategoryKind::Base => self.base.as_mut(),
            CategoryKind::Bonus => self.bonus.as_mut(),
            CategoryKind::Penalty => self.penalty.as_mut(),
        }
    }

    /// Declared categories, in base/bonus/penalty order
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        CategoryKind::ALL.iter().filter_map(|kind| self.get(*kind))
    }
}

/// Top-level category node
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub kind: CategoryKind,
    /// Maximum score this category contributes (0-100)
    pub max_score: u32,
    pub subjects: Vec<Subject>,
    pub tests: Vec<Test>,
    /// Share of the composite attributed to subjects when both subjects and
    /// direct tests are present
    pub subjects_weight: Option<u32>,
}

impl Category {
    /// All test nodes under this category, depth-first
    pub fn all_tests_mut(&mut self) -> Vec<&mut Test> {
        let mut out = Vec::new();
        for test in &mut self.tests {
            out.push(test);
        }
        for subject in &mut self.subjects {
            subject.collect_tests_mut(&mut out);
        }
        out
    }
}

/// Branch node: a topic with its own weight among siblings
#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub name: String,
    /// Sibling weight (0-100 after normalization)
    pub weight: u32,
    pub subjects: Vec<Subject>,
    pub tests: Vec<Test>,
    pub subjects_weight: Option<u32>,
}

impl Subject {
    fn collect_tests_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Test>) {
        for test in &mut self.tests {
            out.push(test);
        }
        for subject in &mut self.subjects {
            subject.collect_tests_mut(out);
        }
    }
}

/// Leaf node: one named check with its concrete invocations
#[derive(Debug, Clone, Serialize)]
pub struct Test {
    pub name: String,
    /// Submission file this check targets, if any
    pub file: Option<String>,
    /// Invocations in input order; order is significant for reproducible
    /// test IDs, not for scoring
    pub calls: Vec<TestCall>,
    /// Normalized records merged in after the run, in report order
    pub results: Vec<TestRecord>,
}

impl Test {
    pub fn new(name: impl Into<String>, file: Option<String>, calls: Vec<TestCall>) -> Self {
        Test {
            name: name.into(),
            file,
            calls,
            results: Vec::new(),
        }
    }
}

/// One concrete invocation of a check
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestCall {
    pub args: Vec<Value>,
}

impl TestCall {
    pub fn new(args: Vec<Value>) -> Self {
        TestCall { args }
    }

    /// Expected count for quantitative checks: the trailing numeric
    /// argument, when present (`["div", 50]` expects 50 occurrences)
    pub fn expected_count(&self) -> Option<u64> {
        self.args.last().and_then(Value::as_u64)
    }
}
