//! Test-engine adapters
//!
//! An adapter drives one external test runner through the engine lifecycle:
//! `setup` (preflight), `run_tests` (one runner invocation per declared
//! test-file category), `normalize_output` (canonical records), `teardown`
//! (background process cleanup). The orchestrator guarantees `teardown`
//! runs no matter how the earlier phases exit.

pub mod jest;
pub mod pytest;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error};
use wait_timeout::ChildExt;

use crate::config::{SetupConfig, SETUP_FILE};
use crate::criteria::CategoryKind;
use crate::error::{Result, RubricError};
use crate::preflight::Preflight;
use crate::process::ProcessSet;
use crate::report::{CategoryResults, FatalError, FatalReport, FATAL_REPORT_FILE};

/// Result of the preflight phase
#[derive(Debug)]
pub enum SetupOutcome {
    /// All checks passed; the run may proceed
    Ready,
    /// Preflight aborted the run; the report was written as an artifact
    Fatal(FatalReport),
}

/// Contract every test engine implements.
///
/// `setup` never fails as a Rust error: preflight problems are captured
/// into the fatal report. `run_tests` and `normalize_output` may fail;
/// `teardown` must be callable in any state, any number of times.
pub trait TestAdapter {
    fn setup(&mut self) -> SetupOutcome;
    fn run_tests(&mut self) -> Result<()>;
    fn normalize_output(&mut self) -> Result<CategoryResults>;
    fn teardown(&mut self);
}

/// Filesystem layout for one grading run
#[derive(Debug, Clone)]
pub struct TestWorkspace {
    /// Root of the student submission
    pub submission_root: PathBuf,
    /// Instructor test files (`test_base.<ext>` etc.)
    pub tests_dir: PathBuf,
    /// Raw and canonical report artifacts
    pub results_dir: PathBuf,
}

impl TestWorkspace {
    pub fn new(submission_root: &Path, tests_dir: &Path, results_dir: &Path) -> Self {
        TestWorkspace {
            submission_root: submission_root.to_path_buf(),
            tests_dir: tests_dir.to_path_buf(),
            results_dir: results_dir.to_path_buf(),
        }
    }

    /// Instructor test file for a category, by runner extension
    pub fn test_file(&self, kind: CategoryKind, ext: &str) -> PathBuf {
        self.tests_dir.join(format!("test_{}.{}", kind, ext))
    }

    /// Raw (pre-normalization) report artifact for a category
    pub fn raw_report_path(&self, kind: CategoryKind) -> PathBuf {
        self.results_dir.join(format!("raw_{}_report.json", kind))
    }

    pub fn fatal_report_path(&self) -> PathBuf {
        self.results_dir.join(FATAL_REPORT_FILE)
    }
}

/// Shared preflight driver: load the setup descriptor (absent file means
/// nothing to check), run the checks, persist the fatal artifact if any
/// errors accumulated.
pub(crate) fn run_setup_phase(
    workspace: &TestWorkspace,
    processes: &mut ProcessSet,
) -> SetupOutcome {
    let descriptor = workspace.submission_root.join(SETUP_FILE);
    if !descriptor.exists() {
        debug!("no setup descriptor, skipping preflight");
        return SetupOutcome::Ready;
    }

    let config = match SetupConfig::load(&descriptor) {
        Ok(config) => config,
        Err(err) => {
            // Corrupt descriptor: captured, never propagated past setup
            let errors = vec![FatalError::setup_exception(format!(
                "could not read setup descriptor: {}",
                err
            ))];
            return write_fatal_report(workspace, errors);
        }
    };

    let errors = Preflight::new(&workspace.submission_root, &workspace.results_dir, config)
        .run(processes);
    if errors.is_empty() {
        SetupOutcome::Ready
    } else {
        write_fatal_report(workspace, errors)
    }
}

fn write_fatal_report(workspace: &TestWorkspace, errors: Vec<FatalError>) -> SetupOutcome {
    let report = FatalReport::new(errors);
    if let Err(err) = report.write(&workspace.fatal_report_path()) {
        error!(error = %err, "could not persist fatal report artifact");
    }
    SetupOutcome::Fatal(report)
}

/// Upper bound on one runner invocation; a runner still alive afterwards
/// is killed and reported as a launch failure
pub const RUNNER_TIMEOUT: Duration = Duration::from_secs(300);

/// Invoke a test runner and wait for it. A nonzero exit is expected content
/// (failing tests); only a launch failure or a blown timeout is an error.
pub(crate) fn invoke_runner(program: &str, args: &[String], cwd: &Path) -> Result<i32> {
    debug!(program, ?args, "invoking test runner");
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| RubricError::RunnerLaunch {
            program: program.to_string(),
            reason: err.to_string(),
        })?;

    match child.wait_timeout(RUNNER_TIMEOUT) {
        Ok(Some(status)) => {
            let code = status.code().unwrap_or(-1);
            debug!(program, code, "test runner finished");
            Ok(code)
        }
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(RubricError::RunnerLaunch {
                program: program.to_string(),
                reason: format!("timed out after {} seconds", RUNNER_TIMEOUT.as_secs()),
            })
        }
        Err(err) => Err(RubricError::Io(err)),
    }
}

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("\u{1b}\\[[0-9;]*m").expect("valid ANSI pattern"))
}

/// Remove terminal color codes runners embed in failure text
pub(crate) fn strip_ansi(text: &str) -> String {
    ansi_pattern().replace_all(text, "").into_owned()
}

/// First line of a failure dump that carries actual information: skips
/// blanks, runner banners, and separator rows.
pub(crate) fn first_meaningful_line(text: &str) -> String {
    let clean = strip_ansi(text);
    clean
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| !is_boilerplate(line))
        .unwrap_or("test run failed before producing results")
        .to_string()
}

fn is_boilerplate(line: &str) -> bool {
    line.starts_with('\u{25cf}')
        || line.starts_with("Test suite failed to run")
        || !line.chars().any(|c| c.is_alphanumeric())
}
