//! Jest engine adapter
//!
//! Runs Jest once per declared test-file category with `--json
//! --outputFile`, then flattens the suite/assertion report into canonical
//! records. A suite that failed before running any assertion (syntax error,
//! missing module) synthesizes a single failing record from the first
//! meaningful line of the suite message.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapter::{
    first_meaningful_line, invoke_runner, run_setup_phase, strip_ansi, SetupOutcome, TestAdapter,
    TestWorkspace,
};
use crate::criteria::CategoryKind;
use crate::error::{Result, RubricError};
use crate::process::ProcessSet;
use crate::report::{CategoryResults, TestRecord, TestStatus};

/// Adapter for the Jest test runner
pub struct JestAdapter {
    workspace: TestWorkspace,
    processes: ProcessSet,
    runner: String,
    runner_args: Vec<String>,
    runner_checked: bool,
}

impl JestAdapter {
    pub fn new(workspace: TestWorkspace) -> Self {
        JestAdapter {
            workspace,
            processes: ProcessSet::new(),
            runner: "npx".to_string(),
            runner_args: vec!["jest".to_string()],
            runner_checked: false,
        }
    }

    /// Replace the runner program (hermetic tests drive the adapter with a
    /// stub script instead of a real Jest install)
    pub fn with_runner(workspace: TestWorkspace, program: &str) -> Self {
        JestAdapter {
            workspace,
            processes: ProcessSet::new(),
            runner: program.to_string(),
            runner_args: Vec::new(),
            runner_checked: false,
        }
    }

    /// Toolchain probe, run once before the first runner invocation
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

impl TestAdapter for JestAdapter {
    fn setup(&mut self) -> SetupOutcome {
        run_setup_phase(&self.workspace, &mut self.processes)
    }

    fn run_tests(&mut self) -> Result<()> {
        self.ensure_runner_available()?;
        fs::create_dir_all(&self.workspace.results_dir)?;

        for kind in CategoryKind::ALL {
            let test_file = self.workspace.test_file(kind, "js");
            if !test_file.exists() {
                debug!(category = %kind, "no test file declared");
                continue;
            }
            let raw_path = self.workspace.raw_report_path(kind);
            let mut args = self.runner_args.clone();
            args.push(test_file.display().to_string());
            args.push("--json".to_string());
            args.push(format!("--outputFile={}", raw_path.display()));

            // Failing tests exit nonzero; that is report content, not an error
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
struct JestReport {
    #[serde(default, rename = "testResults")]
    test_results: Vec<JestSuite>,
}

#[derive(Debug, Deserialize)]
struct JestSuite {
    #[serde(default)]
    name: String,
    /// Suite-level failure text when the file could not run
    #[serde(default)]
    message: String,
    #[serde(default, rename = "assertionResults")]
    assertion_results: Vec<JestAssertion>,
}

#[derive(Debug, Deserialize)]
struct JestAssertion {
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "failureMessages")]
    failure_messages: Vec<String>,
    #[serde(default, rename = "ancestorTitles")]
    ancestor_titles: Vec<String>,
}

fn parse_report(path: &Path, kind: CategoryKind) -> Result<Vec<TestRecord>> {
    let content = fs::read_to_string(path)?;
    let report: JestReport = serde_json::from_str(&content)?;

    let mut records = Vec::new();
    for suite in &report.test_results {
        if suite.assertion_results.is_empty() {
            if suite.message.trim().is_empty() {
                continue;
            }
            // The whole file failed before producing a per-test breakdown
            records.push(TestRecord {
                test: suite_name(suite, kind),
                status: TestStatus::Failed,
                message: first_meaningful_line(&suite.message),
                subject: kind.to_string(),
                actual_count: None,
            });
            continue;
        }
        for assertion in &suite.assertion_results {
            let subject = assertion
                .ancestor_titles
                .last()
                .cloned()
                .unwrap_or_else(|| kind.to_string());
            let message = assertion
                .failure_messages
                .first()
                .map(|m| strip_ansi(m))
                .unwrap_or_default();
            records.push(TestRecord {
                test: assertion.title.clone(),
                status: map_status(&assertion.status),
                message,
                subject,
                actual_count: None,
            });
        }
    }
    Ok(records)
}

fn suite_name(suite: &JestSuite, kind: CategoryKind) -> String {
    Path::new(&suite.name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{} tests", kind))
}

fn map_status(status: &str) -> TestStatus {
    match status {
        "passed" => TestStatus::Passed,
        "pending" | "skipped" | "todo" | "disabled" => TestStatus::Skipped,
        _ => TestStatus::Failed,
    }
}
