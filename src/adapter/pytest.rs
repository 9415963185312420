//! Pytest engine adapter
//!
//! Runs pytest once per declared test-file category with the json-report
//! plugin, then flattens its `tests` array into canonical records. A run
//! that failed during collection (import error, syntax error) synthesizes a
//! single failing record from the collector's failure text.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapter::{
    first_meaningful_line, invoke_runner, run_setup_phase, SetupOutcome, TestAdapter,
    TestWorkspace,
};
use crate::criteria::CategoryKind;
use crate::error::{Result, RubricError};
use crate::process::ProcessSet;
use crate::report::{CategoryResults, TestRecord, TestStatus};

/// Adapter for the pytest test runner (json-report plugin format)
pub struct PytestAdapter {
    workspace: TestWorkspace,
    processes: ProcessSet,
    runner: String,
    runner_args: Vec<String>,
    runner_checked: bool,
}

impl PytestAdapter {
    pub fn new(workspace: TestWorkspace) -> Self {
        PytestAdapter {
            workspace,
            processes: ProcessSet::new(),
            runner: "python3".to_string(),
            runner_args: vec!["-m".to_string(), "pytest".to_string()],
            runner_checked: false,
        }
    }

    /// Replace the runner program (hermetic tests drive the adapter with a
    /// stub script instead of a real pytest install)
    pub fn with_runner(workspace: TestWorkspace, program: &str) -> Self {
        PytestAdapter {
            workspace,
            processes: ProcessSet::new(),
            runner: program.to_string(),
            runner_args: Vec::new(),
            runner_checked: false,
        }
    }

    fn ensure_runner_available(&mut self) -> Result<()> {
        if self.runner_checked {
            return Ok(());
        }
        let mut args = self.runner_args.clone();
        args.push("--version".to_string());
        invoke_runner(&self.runner, &args, &self.workspace.tests_dir)?;
        self.runner_checked = true;
        Ok(())
    }
}

impl TestAdapter for PytestAdapter {
    fn setup(&mut self) -> SetupOutcome {
        run_setup_phase(&self.workspace, &mut self.processes)
    }

    fn run_tests(&mut self) -> Result<()> {
        self.ensure_runner_available()?;
        fs::create_dir_all(&self.workspace.results_dir)?;

        for kind in CategoryKind::ALL {
            let test_file = self.workspace.test_file(kind, "py");
            if !test_file.exists() {
                debug!(category = %kind, "no test file declared");
                continue;
            }
            let raw_path = self.workspace.raw_report_path(kind);
            let mut args = self.runner_args.clone();
            args.push(test_file.display().to_string());
            args.push("--json-report".to_string());
            args.push(format!("--json-report-file={}", raw_path.display()));

            invoke_runner(&self.runner, &args, &self.workspace.tests_dir)?;

            if !raw_path.exists() {
                return Err(RubricError::MissingReport { path: raw_path });
            }
        }
        Ok(())
    }

    fn normalize_output(&mut self) -> Result<CategoryResults> {
        let mut results = CategoryResults::default();
        for kind in CategoryKind::ALL {
            let raw_path = self.workspace.raw_report_path(kind);
            if !raw_path.exists() {
                continue;
            }
            match parse_report(&raw_path, kind) {
                Ok(records) => results.set(kind, records),
                Err(err) => {
                    warn!(path = %raw_path.display(), error = %err, "skipping unreadable raw report");
                }
            }
            let _ = fs::remove_file(&raw_path);
        }
        results.write_artifacts(&self.workspace.results_dir)?;
        Ok(results)
    }

    fn teardown(&mut self) {
        self.processes.shutdown();
    }
}

#[derive(Debug, Deserialize)]
struct PytestReport {
    #[serde(default)]
    tests: Vec<PytestTest>,
    #[serde(default)]
    collectors: Vec<PytestCollector>,
}

#[derive(Debug, Deserialize)]
struct PytestTest {
    #[serde(default)]
    nodeid: String,
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    setup: Option<PytestStage>,
    #[serde(default)]
    call: Option<PytestStage>,
}

#[derive(Debug, Deserialize)]
struct PytestStage {
    #[serde(default)]
    longrepr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PytestCollector {
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    longrepr: Option<String>,
}

fn parse_report(path: &Path, kind: CategoryKind) -> Result<Vec<TestRecord>> {
    let content = fs::read_to_string(path)?;
    let report: PytestReport = serde_json::from_str(&content)?;

    if report.tests.is_empty() {
        // Collection failed before any per-test breakdown
        if let Some(collector) = report
            .collectors
            .iter()
            .find(|c| c.outcome == "error" && c.longrepr.is_some())
        {
            let message = collector.longrepr.as_deref().unwrap_or_default();
            return Ok(vec![TestRecord {
                test: format!("test_{}", kind),
                status: TestStatus::Failed,
                message: first_meaningful_line(message),
                subject: kind.to_string(),
                actual_count: None,
            }]);
        }
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for test in &report.tests {
        let parts: Vec<&str> = test.nodeid.split("::").collect();
        let name = parts.last().copied().unwrap_or(test.nodeid.as_str());
        // A class between file and test is the nearest grouping label
        let subject = if parts.len() >= 3 {
            parts[parts.len() - 2].to_string()
        } else {
            kind.to_string()
        };
        let message = test
            .call
            .as_ref()
            .and_then(|stage| stage.longrepr.clone())
            .or_else(|| test.setup.as_ref().and_then(|stage| stage.longrepr.clone()))
            .unwrap_or_default();
        records.push(TestRecord {
            test: name.to_string(),
            status: map_outcome(&test.outcome),
            message,
            subject,
            actual_count: None,
        });
    }
    Ok(records)
}

fn map_outcome(outcome: &str) -> TestStatus {
    match outcome {
        "passed" | "xpassed" => TestStatus::Passed,
        "skipped" | "xfailed" => TestStatus::Skipped,
        _ => TestStatus::Failed,
    }
}
