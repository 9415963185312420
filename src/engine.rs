//! Engine orchestrator
//!
//! Drives one grading run through the adapter lifecycle:
//! IDLE → SETUP → RUNNING → NORMALIZING → TEARDOWN → DONE, with FATAL
//! reachable only from SETUP. Teardown is the reliability contract of this
//! module: it runs from every non-idle state, including fatal aborts and
//! error exits from the run and normalize phases.
//!
//! One orchestrator instance handles exactly one run; the fatal flag and
//! the adapter's process registry are instance state, never shared.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::adapter::jest::JestAdapter;
use crate::adapter::pytest::PytestAdapter;
use crate::adapter::{SetupOutcome, TestAdapter, TestWorkspace};
use crate::error::{Result, RubricError};
use crate::report::{CategoryResults, FatalReport};

/// Supported test frameworks: a closed registry, resolved once at
/// orchestrator construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Jest,
    Pytest,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Jest => "jest",
            Framework::Pytest => "pytest",
        }
    }

    fn supported() -> &'static str {
        "jest, pytest"
    }

    fn create_adapter(&self, workspace: TestWorkspace) -> Box<dyn TestAdapter> {
        match self {
            Framework::Jest => Box::new(JestAdapter::new(workspace)),
            Framework::Pytest => Box::new(PytestAdapter::new(workspace)),
        }
    }
}

impl FromStr for Framework {
    type Err = RubricError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jest" => Ok(Framework::Jest),
            "pytest" => Ok(Framework::Pytest),
            other => Err(RubricError::UnknownFramework {
                name: other.to_string(),
                supported: Framework::supported().to_string(),
            }),
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle states of a grading run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Setup,
    Running,
    Normalizing,
    Teardown,
    Done,
    Fatal,
}

/// How a run ended when no error was raised
#[derive(Debug)]
pub enum EngineOutcome {
    /// Preflight aborted the run; tests never executed
    Fatal(FatalReport),
    /// Tests ran and were normalized
    Completed(CategoryResults),
}

/// One grading run over one adapter
pub struct Orchestrator {
    adapter: Box<dyn TestAdapter>,
    state: EngineState,
    fatal: bool,
}

impl Orchestrator {
    /// Resolve `framework_name` and build the adapter. Unknown names fail
    /// here, before any resource is touched.
    pub fn new(framework_name: &str, workspace: TestWorkspace) -> Result<Self> {
        let framework = Framework::from_str(framework_name)?;
        info!(framework = %framework, "orchestrator ready");
        Ok(Orchestrator {
            adapter: framework.create_adapter(workspace),
            state: EngineState::Idle,
            fatal: false,
        })
    }

    /// Inject a custom adapter (used by embedders and tests)
    pub fn with_adapter(adapter: Box<dyn TestAdapter>) -> Self {
        Orchestrator {
            adapter,
            state: EngineState::Idle,
            fatal: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// True once preflight has aborted this run
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Execute the full lifecycle. Teardown runs no matter how the earlier
    /// phases exited; the phase result is captured first and propagated
    /// after cleanup.
    pub fn run(&mut self) -> Result<EngineOutcome> {
        self.state = EngineState::Setup;
        let outcome = self.drive();

        self.state = EngineState::Teardown;
        self.adapter.teardown();
        self.state = EngineState::Done;

        outcome
    }

    fn drive(&mut self) -> Result<EngineOutcome> {
        info!("running preflight setup");
        match self.adapter.setup() {
            SetupOutcome::Fatal(report) => {
                self.fatal = true;
                self.state = EngineState::Fatal;
                warn!(errors = report.errors.len(), "preflight aborted the run");
                return Ok(EngineOutcome::Fatal(report));
            }
            SetupOutcome::Ready => {}
        }

        self.state = EngineState::Running;
        info!("running tests");
        self.adapter.run_tests()?;

        self.state = EngineState::Normalizing;
        info!("normalizing reports");
        let results = self.adapter.normalize_output()?;
        Ok(EngineOutcome::Completed(results))
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FatalError, TestRecord};
    use std::sync::{Arc, Mutex};

    /// Records lifecycle calls and fails on demand
    struct ScriptedAdapter {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fatal_setup: bool,
        fail_run: bool,
        fail_normalize: bool,
    }

    impl ScriptedAdapter {
        fn new(calls: Arc<Mutex<Vec<&'static str>>>) -> Self {
            ScriptedAdapter {
                calls,
                fatal_setup: false,
                fail_run: false,
                fail_normalize: false,
            }
        }
    }

    impl TestAdapter for ScriptedAdapter {
        fn setup(&mut self) -> SetupOutcome {
            self.calls.lock().unwrap().push("setup");
            if self.fatal_setup {
                SetupOutcome::Fatal(FatalReport::new(vec![FatalError::file_check("main.py")]))
            } else {
                SetupOutcome::Ready
            }
        }

        fn run_tests(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("run_tests");
            if self.fail_run {
                return Err(RubricError::MissingReport {
                    path: "/nowhere/raw_base_report.json".into(),
                });
            }
            Ok(())
        }

        fn normalize_output(&mut self) -> Result<CategoryResults> {
            self.calls.lock().unwrap().push("normalize");
            if self.fail_normalize {
                return Err(RubricError::MissingReport {
                    path: "/nowhere/raw_base_report.json".into(),
                });
            }
            let mut results = CategoryResults::default();
            results.base = vec![TestRecord::passed("test_a", "base")];
            Ok(results)
        }

        fn teardown(&mut self) {
            self.calls.lock().unwrap().push("teardown");
        }
    }

    fn tracked_adapter() -> (Arc<Mutex<Vec<&'static str>>>, ScriptedAdapter) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let adapter = ScriptedAdapter::new(Arc::clone(&calls));
        (calls, adapter)
    }

    #[test]
    fn test_unknown_framework_is_rejected_at_construction() {
        let workspace = TestWorkspace::new(
            std::path::Path::new("/tmp/sub"),
            std::path::Path::new("/tmp/tests"),
            std::path::Path::new("/tmp/results"),
        );
        let err = Orchestrator::new("mocha", workspace).unwrap_err();
        assert!(err.is_config_error());
        assert!(matches!(err, RubricError::UnknownFramework { name, .. } if name == "mocha"));
    }

    #[test]
    fn test_happy_path_runs_all_phases_in_order() {
        let (calls, adapter) = tracked_adapter();
        let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

        let outcome = orchestrator.run().unwrap();
        assert!(matches!(outcome, EngineOutcome::Completed(results) if results.base.len() == 1));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["setup", "run_tests", "normalize", "teardown"]
        );
        assert_eq!(orchestrator.state(), EngineState::Done);
        assert!(!orchestrator.is_fatal());
    }

    #[test]
    fn test_fatal_setup_skips_tests_but_not_teardown() {
        let (calls, mut adapter) = tracked_adapter();
        adapter.fatal_setup = true;
        let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

        let outcome = orchestrator.run().unwrap();
        match outcome {
            EngineOutcome::Fatal(report) => assert_eq!(report.errors.len(), 1),
            EngineOutcome::Completed(_) => panic!("fatal setup must not complete"),
        }
        assert_eq!(*calls.lock().unwrap(), vec!["setup", "teardown"]);
        assert!(orchestrator.is_fatal());
    }

    #[test]
    fn test_run_tests_error_still_tears_down() {
        let (calls, mut adapter) = tracked_adapter();
        adapter.fail_run = true;
        let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

        let err = orchestrator.run().unwrap_err();
        assert!(matches!(err, RubricError::MissingReport { .. }));
        assert_eq!(*calls.lock().unwrap(), vec!["setup", "run_tests", "teardown"]);
    }

    #[test]
    fn test_normalize_error_still_tears_down() {
        let (calls, mut adapter) = tracked_adapter();
        adapter.fail_normalize = true;
        let mut orchestrator = Orchestrator::with_adapter(Box::new(adapter));

        assert!(orchestrator.run().is_err());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["setup", "run_tests", "normalize", "teardown"]
        );
    }

    #[test]
    fn test_framework_parsing() {
        assert_eq!(Framework::from_str("jest").unwrap(), Framework::Jest);
        assert_eq!(Framework::from_str("pytest").unwrap(), Framework::Pytest);
        assert!(Framework::from_str("unittest").is_err());
    }
}
