//! Canonical test reports
//!
//! Every adapter, whatever its underlying runner format, normalizes into the
//! same row shape: `{test, status, message, subject}`. Rows are grouped per
//! category and persisted as `test_<category>_results.json` artifacts for
//! the downstream feedback layer.

pub mod fatal;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::criteria::CategoryKind;
use crate::error::Result;

pub use fatal::{FatalError, FatalKind, FatalReport, FATAL_REPORT_FILE};

/// Outcome of one executed check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One canonical test result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Test name as reported by the runner
    pub test: String,
    pub status: TestStatus,
    /// Failure text; empty for passing tests
    #[serde(default)]
    pub message: String,
    /// Attribution label (nearest grouping in the raw report, or the
    /// category name)
    #[serde(default)]
    pub subject: String,
    /// Observed count for count-based (quantitative) checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_count: Option<u64>,
}

impl TestRecord {
    pub fn passed(test: impl Into<String>, subject: impl Into<String>) -> Self {
        TestRecord {
            test: test.into(),
            status: TestStatus::Passed,
            message: String::new(),
            subject: subject.into(),
            actual_count: None,
        }
    }

    pub fn failed(
        test: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TestRecord {
            test: test.into(),
            status: TestStatus::Failed,
            message: message.into(),
            subject: subject.into(),
            actual_count: None,
        }
    }
}

/// Normalized results keyed by all three categories.
///
/// Categories with no report file hold an empty list; consumers can rely on
/// every key being present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryResults {
    pub base: Vec<TestRecord>,
    pub bonus: Vec<TestRecord>,
    pub penalty: Vec<TestRecord>,
}

impl CategoryResults {
    pub fn get(&self, kind: CategoryKind) -> &[TestRecord] {
        match kind {
            CategoryKind::Base => &self.base,
            CategoryKind::Bonus => &self.bonus,
            CategoryKind::Penalty => &self.penalty,
        }
    }

    pub fn set(&mut self, kind: CategoryKind, records: Vec<TestRecord>) {
        match kind {
            CategoryKind::Base => self.base = records,
            CategoryKind::Bonus => self.bonus = records,
            CategoryKind::Penalty => self.penalty = records,
        }
    }

    pub fn total(&self) -> usize {
        self.base.len() + self.bonus.len() + self.penalty.len()
    }

    /// Artifact path for one category's canonical results
    pub fn artifact_path(dir: &Path, kind: CategoryKind) -> PathBuf {
        dir.join(format!("test_{}_results.json", kind))
    }

    /// Persist one artifact per category (all three, even when empty)
    pub fn write_artifacts(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for kind in CategoryKind::ALL {
            let path = Self::artifact_path(dir, kind);
            let json = serde_json::to_string_pretty(self.get(kind))?;
            fs::write(path, json)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_serializes_lowercase() {
        let record = TestRecord::passed("test_a", "routes");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"passed\""));
        // actual_count is omitted unless the check is quantitative
        assert!(!json.contains("actual_count"));
    }

    #[test]
    fn test_record_roundtrip_from_artifact_row() {
        let raw = r#"{"test": "Route: /users - returns 200", "status": "failed",
                      "message": "expected 200, got 500", "subject": "/users"}"#;
        let record: TestRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.status, TestStatus::Failed);
        assert_eq!(record.subject, "/users");
        assert_eq!(record.actual_count, None);
    }

    #[test]
    fn test_write_artifacts_emits_all_three_categories() {
        let dir = TempDir::new().unwrap();
        let mut results = CategoryResults::default();
        results.set(
            CategoryKind::Base,
            vec![TestRecord::passed("test_a", "base")],
        );

        results.write_artifacts(dir.path()).unwrap();

        for kind in CategoryKind::ALL {
            let path = CategoryResults::artifact_path(dir.path(), kind);
            assert!(path.exists(), "missing artifact for {}", kind);
        }
        let bonus: Vec<TestRecord> = serde_json::from_str(
            &std::fs::read_to_string(CategoryResults::artifact_path(
                dir.path(),
                CategoryKind::Bonus,
            ))
            .unwrap(),
        )
        .unwrap();
        assert!(bonus.is_empty());
    }
}
