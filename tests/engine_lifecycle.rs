//! Full-engine lifecycle tests
//!
//! Drive the real orchestrator and jest adapter against a stub runner
//! script, so the whole pipeline runs hermetically: preflight, runner
//! invocation, report normalization, artifact persistence, scoring.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use rubric_core::adapter::jest::JestAdapter;
use rubric_core::adapter::TestWorkspace;
use rubric_core::config::CriteriaConfig;
use rubric_core::criteria::{parse_tree, CategoryKind};
use rubric_core::engine::{EngineOutcome, Orchestrator};
use rubric_core::error::RubricError;
use rubric_core::report::{fatal, CategoryResults, FatalKind, FatalReport};
use rubric_core::score::ScoreAggregator;

struct Fixture {
    _submission: TempDir,
    _tests: TempDir,
    _results: TempDir,
    workspace: TestWorkspace,
}

fn fixture() -> Fixture {
    let submission = TempDir::new().unwrap();
    let tests = TempDir::new().unwrap();
    let results = TempDir::new().unwrap();
    let workspace = TestWorkspace::new(submission.path(), tests.path(), results.path());
    Fixture {
        _submission: submission,
        _tests: tests,
        _results: results,
        workspace,
    }
}

fn write_runner_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-jest");
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Stub runner: answers --version, otherwise writes a fixed jest-format
/// report to the requested output file and exits 1 (failing tests are
/// legitimate report content, not an execution error).
fn reporting_runner(dir: &Path, report_json: &str) -> PathBuf {
    let body = format!(
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo 29.0.0
  exit 0
fi
out=""
for arg in "$@"; do
  case "$arg" in
    --outputFile=*) out="${{arg#--outputFile=}}" ;;
  esac
done
cat > "$out" <<'JSON'
{report}
JSON
exit 1
"#,
        report = report_json
    );
    write_runner_script(dir, &body)
}

#[test]
fn test_full_run_grades_a_submission() {
    let fx = fixture();
    fs::write(fx.workspace.tests_dir.join("test_base.js"), "// suite\n").unwrap();
    let runner = reporting_runner(
        &fx.workspace.tests_dir,
        r#"{"testResults": [{
            "name": "test_base.js",
            "assertionResults": [
                {"title": "test_a", "status": "passed", "ancestorTitles": ["Route: /users"], "failureMessages": []},
                {"title": "test_b", "status": "failed", "ancestorTitles": ["Route: /users"], "failureMessages": ["expected 200, got 500"]}
            ]
        }]}"#,
    );

    let adapter = JestAdapter::with_runner(fx.workspace.clone(), runner.to_str().unwrap());
    let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

    let results = match orchestrator.run().unwrap() {
        EngineOutcome::Completed(results) => results,
        EngineOutcome::Fatal(report) => panic!("unexpected fatal: {:?}", report),
    };
    assert_eq!(results.base.len(), 2);
    assert_eq!(results.base[0].subject, "Route: /users");

    // canonical artifacts persisted for all three categories
    for kind in CategoryKind::ALL {
        assert!(CategoryResults::artifact_path(&fx.workspace.results_dir, kind).exists());
    }
    // raw report consumed
    assert!(!fx.workspace.raw_report_path(CategoryKind::Base).exists());

    // score the run end to end
    let config: CriteriaConfig =
        serde_json::from_str(r#"{"base": {"weight": 100, "tests": ["test_a", "test_b"]}}"#)
            .unwrap();
    let mut tree = parse_tree(&config).unwrap();
    let aggregator = ScoreAggregator::new();
    aggregator.merge_results(&mut tree, &results);
    assert_eq!(aggregator.grade(tree).unwrap().final_score, 50.0);
}

#[test]
fn test_preflight_failure_short_circuits_the_run() {
    let fx = fixture();
    // descriptor requires a file the submission does not have
    fs::write(
        fx.workspace.submission_root.join("autograder-setup.json"),
        r#"{"file_checks": ["main.py"]}"#,
    )
    .unwrap();
    fs::write(fx.workspace.tests_dir.join("test_base.js"), "// suite\n").unwrap();

    // a runner that cannot exist: reaching run_tests would error loudly
    let adapter = JestAdapter::with_runner(fx.workspace.clone(), "/nonexistent/fake-jest");
    let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

    let report = match orchestrator.run().unwrap() {
        EngineOutcome::Fatal(report) => report,
        EngineOutcome::Completed(_) => panic!("preflight failure must abort the run"),
    };
    assert!(orchestrator.is_fatal());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, FatalKind::FileCheck);
    assert!(report.errors[0].message.contains("main.py"));

    // the artifact is on disk and renders into user-facing feedback
    let artifact = fx.workspace.fatal_report_path();
    assert!(artifact.exists());
    let loaded = FatalReport::load(&artifact).unwrap();
    assert_eq!(loaded, report);
    let feedback = fatal::feedback_from_file(&artifact);
    assert!(feedback.contains("## Missing Files"));
    assert!(feedback.contains("- `main.py`"));

    // no canonical artifacts: normalize_output never ran
    assert!(!CategoryResults::artifact_path(&fx.workspace.results_dir, CategoryKind::Base).exists());
}

#[test]
fn test_background_server_survives_setup_and_is_torn_down() {
    let fx = fixture();
    fs::write(
        fx.workspace.submission_root.join("autograder-setup.json"),
        r#"{"commands": [{"command": "sleep 30", "name": "app server", "background": true}]}"#,
    )
    .unwrap();
    fs::write(fx.workspace.tests_dir.join("test_base.js"), "// suite\n").unwrap();
    let runner = reporting_runner(
        &fx.workspace.tests_dir,
        r#"{"testResults": [{
            "name": "test_base.js",
            "assertionResults": [
                {"title": "server responds", "status": "passed", "ancestorTitles": [], "failureMessages": []}
            ]
        }]}"#,
    );

    let adapter = JestAdapter::with_runner(fx.workspace.clone(), runner.to_str().unwrap());
    let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

    // run() tears the server down; the sleep must not outlive the engine
    let start = std::time::Instant::now();
    let outcome = orchestrator.run().unwrap();
    assert!(matches!(outcome, EngineOutcome::Completed(_)));
    assert!(start.elapsed() < std::time::Duration::from_secs(20));
}

#[test]
fn test_runner_without_report_is_a_runtime_error() {
    let fx = fixture();
    fs::write(fx.workspace.tests_dir.join("test_base.js"), "// suite\n").unwrap();
    // exits cleanly but never writes the report artifact
    let runner = write_runner_script(&fx.workspace.tests_dir, "#!/bin/sh\nexit 0\n");

    let adapter = JestAdapter::with_runner(fx.workspace.clone(), runner.to_str().unwrap());
    let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

    let err = orchestrator.run().unwrap_err();
    assert!(matches!(err, RubricError::MissingReport { .. }));
    assert!(!orchestrator.is_fatal());
}

#[test]
fn test_suite_failure_becomes_a_single_failing_record() {
    let fx = fixture();
    fs::write(fx.workspace.tests_dir.join("test_base.js"), "syntax error{\n").unwrap();
    let runner = reporting_runner(
        &fx.workspace.tests_dir,
        r#"{"testResults": [{
            "name": "test_base.js",
            "message": "Test suite failed to run\n\nSyntaxError: unexpected token, expected \",\"",
            "assertionResults": []
        }]}"#,
    );

    let adapter = JestAdapter::with_runner(fx.workspace.clone(), runner.to_str().unwrap());
    let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

    let results = match orchestrator.run().unwrap() {
        EngineOutcome::Completed(results) => results,
        EngineOutcome::Fatal(report) => panic!("unexpected fatal: {:?}", report),
    };
    assert_eq!(results.base.len(), 1);
    assert_eq!(results.base[0].test, "test_base");
    assert!(results.base[0].message.starts_with("SyntaxError"));
}
