//! Preflight checks
//!
//! Validates submission structure and launches required processes before any
//! test runs: glob file-existence checks against the submission root, then
//! the configured setup commands. Blocking commands must exit zero.
//! Background commands are given a fixed grace period; a process that has
//! already died when the window closes is a fatal error, one still alive is
//! registered for teardown.
//!
//! Every failure is captured as a [`FatalError`] value; nothing here
//! propagates as a Rust error past the caller's `setup()` phase.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use globset::Glob;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::config::{CommandSpec, SetupConfig};
use crate::process::{BackgroundProcess, ProcessSet};
use crate::report::FatalError;

/// Liveness window for background commands. Fixed-duration heuristic: a
/// process that fails just after the window reports as falsely healthy.
pub const BACKGROUND_GRACE: Duration = Duration::from_secs(2);

/// One preflight pass over a submission
pub struct Preflight {
    submission_root: PathBuf,
    log_dir: PathBuf,
    config: SetupConfig,
    errors: Vec<FatalError>,
}

impl Preflight {
    /// `log_dir` receives the stderr capture files for background commands.
    pub fn new(submission_root: &Path, log_dir: &Path, config: SetupConfig) -> Self {
        Preflight {
            submission_root: submission_root.to_path_buf(),
            log_dir: log_dir.to_path_buf(),
            config,
            errors: Vec::new(),
        }
    }

    /// Run all checks; background survivors land in `processes`. Returns
    /// the accumulated fatal errors (empty on success).
    pub fn run(mut self, processes: &mut ProcessSet) -> Vec<FatalError> {
        self.check_files();
        self.run_commands(processes);
        if !self.errors.is_empty() {
            error!(count = self.errors.len(), "preflight found fatal errors");
        }
        self.errors
    }

    fn check_files(&mut self) {
        if self.config.file_checks.is_empty() {
            return;
        }
        debug!("checking required files");

        // Submission-relative paths, files and directories alike
        let candidates: Vec<String> = WalkDir::new(&self.submission_root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.submission_root)
                    .ok()
                    .map(|rel| rel.to_string_lossy().into_owned())
            })
            .collect();

        for pattern in &self.config.file_checks {
            let matcher = match Glob::new(pattern) {
                Ok(glob) => glob.compile_matcher(),
                Err(err) => {
                    self.errors.push(FatalError::setup_exception(format!(
                        "invalid file check pattern '{}': {}",
                        pattern, err
                    )));
                    continue;
                }
            };
            if !candidates.iter().any(|path| matcher.is_match(path)) {
                error!(pattern = pattern.as_str(), "required file missing");
                self.errors.push(FatalError::file_check(pattern));
            }
        }
    }

    fn run_commands(&mut self, processes: &mut ProcessSet) {
        let commands = std::mem::take(&mut self.config.commands);
        for spec in &commands {
            let argv = match shlex::split(&spec.command) {
                Some(argv) if !argv.is_empty() => argv,
                _ => {
                    self.errors.push(FatalError::command_failure(
                        &spec.name,
                        format!("could not parse command line '{}'", spec.command),
                        None,
                    ));
                    continue;
                }
            };
            if spec.background {
                self.run_background(spec, &argv, processes);
            } else {
                self.run_blocking(spec, &argv);
            }
        }
    }

    fn run_blocking(&mut self, spec: &CommandSpec, argv: &[String]) {
        info!(name = spec.name.as_str(), "running setup command");
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&self.submission_root)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let details = serde_json::json!({
                    "command": spec.command,
                    "exit_code": output.status.code(),
                    "stdout": String::from_utf8_lossy(&output.stdout),
                    "stderr": String::from_utf8_lossy(&output.stderr),
                });
                self.errors.push(FatalError::command_failure(
                    &spec.name,
                    format!("exit status {}", output.status.code().unwrap_or(-1)),
                    Some(details),
                ));
            }
            Err(err) => {
                self.errors.push(FatalError::command_failure(
                    &spec.name,
                    format!("failed to launch: {}", err),
                    None,
                ));
            }
        }
    }

    fn run_background(&mut self, spec: &CommandSpec, argv: &[String], processes: &mut ProcessSet) {
        info!(name = spec.name.as_str(), "launching background command");
        let stderr_path = self.stderr_log_path(&spec.name);
        if let Err(err) = fs::create_dir_all(&self.log_dir) {
            self.errors.push(FatalError::setup_exception(format!(
                "could not create log directory for '{}': {}",
                spec.name, err
            )));
            return;
        }
        let stderr_file = match fs::File::create(&stderr_path) {
            Ok(file) => file,
            Err(err) => {
                self.errors.push(FatalError::setup_exception(format!(
                    "could not create log file for '{}': {}",
                    spec.name, err
                )));
                return;
            }
        };

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&self.submission_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr_file)
            .spawn();

        let mut process = match child {
            Ok(child) => BackgroundProcess::new(spec.name.as_str(), child),
            Err(err) => {
                self.errors.push(FatalError::command_failure(
                    &spec.name,
                    format!("failed to launch: {}", err),
                    None,
                ));
                return;
            }
        };

        // Fixed liveness window, not a startup guarantee
        thread::sleep(BACKGROUND_GRACE);
        if process.is_running() {
            processes.register(process);
        } else {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            let details = serde_json::json!({
                "command": spec.command,
                "stderr": stderr,
            });
            self.errors.push(FatalError::command_failure(
                &spec.name,
                "exited during the startup grace period",
                Some(details),
            ));
        }
    }

    fn stderr_log_path(&self, name: &str) -> PathBuf {
        let slug: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        self.log_dir.join(format!("{}.stderr.log", slug))
    }
}
