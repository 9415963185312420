//! Fatal preflight errors and their user-facing report
//!
//! Preflight failures never surface as Rust errors: they accumulate into a
//! [`FatalReport`] artifact (`fatal_report.json`) and are rendered into
//! markdown feedback for the student. Rendering is a pure transformation
//! and must never leak raw parse errors into the output.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// File name of the fatal error artifact
pub const FATAL_REPORT_FILE: &str = "fatal_report.json";

/// Classification of a preflight failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// A required submission file or directory is missing
    FileCheck,
    /// A setup command failed to run, exited nonzero, or died early
    CommandFailure,
    /// An unexpected error while interpreting the setup descriptor
    SetupException,
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalKind::FileCheck => write!(f, "file_check"),
            FatalKind::CommandFailure => write!(f, "command_failure"),
            FatalKind::SetupException => write!(f, "setup_exception"),
        }
    }
}

/// One error found during preflight checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatalError {
    #[serde(rename = "type")]
    pub kind: FatalKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl FatalError {
    pub fn file_check(pattern: &str) -> Self {
        FatalError {
            kind: FatalKind::FileCheck,
            message: format!("required file or directory not found: '{}'", pattern),
            details: Some(serde_json::json!({ "missing_file": pattern })),
        }
    }

    pub fn command_failure(name: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        FatalError {
            kind: FatalKind::CommandFailure,
            message: format!("setup command '{}' failed: {}", name, message.into()),
            details,
        }
    }

    pub fn setup_exception(message: impl Into<String>) -> Self {
        FatalError {
            kind: FatalKind::SetupException,
            message: message.into(),
            details: None,
        }
    }
}

/// The structured artifact written when preflight aborts a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FatalReport {
    pub errors: Vec<FatalError>,
}

impl FatalReport {
    pub fn new(errors: Vec<FatalError>) -> Self {
        FatalReport { errors }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Persist the artifact
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let report: FatalReport = serde_json::from_str(&content)?;
        Ok(report)
    }
}

/// Render user-facing markdown feedback for a fatal report artifact.
///
/// A missing or unparsable artifact yields a fixed administrator-contact
/// message instead of the underlying error text.
pub fn feedback_from_file(path: &Path) -> String {
    match FatalReport::load(path) {
        Ok(report) => render_feedback(&report),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read fatal report artifact");
            "## Error\nThe grading report could not be read. Please contact an administrator."
                .to_string()
        }
    }
}

/// Render user-facing markdown feedback for an in-memory fatal report
pub fn render_feedback(report: &FatalReport) -> String {
    if report.errors.is_empty() {
        return "## No Fatal Errors Found\nYour submission passed all initial checks."
            .to_string();
    }

    let mut out = vec![
        "# Autograder Fatal Error Report".to_string(),
        String::new(),
        "The autograder could not run due to the following critical issues with your \
         submission. Please fix them and resubmit."
            .to_string(),
    ];

    let file_checks: Vec<&FatalError> = report
        .errors
        .iter()
        .filter(|e| e.kind == FatalKind::FileCheck)
        .collect();
    if !file_checks.is_empty() {
        out.push(String::new());
        out.push("## Missing Files".to_string());
        out.push(
            "The following required files were not found. Make sure they are named \
             correctly and located in the root of your project."
                .to_string(),
        );
        for error in file_checks {
            out.push(format!("- `{}`", extract_filename(&error.message)));
        }
    }

    for kind in [FatalKind::CommandFailure, FatalKind::SetupException] {
        let group: Vec<&FatalError> =
            report.errors.iter().filter(|e| e.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        out.push(String::new());
        out.push(format!("## {}", section_title(kind)));
        for error in group {
            out.push(format!("- {}", error.message));
        }
    }

    out.push(String::new());
    out.push(
        "**Next steps:** review the errors above, correct your project files, and submit \
         again."
            .to_string(),
    );

    out.join("\n")
}

fn section_title(kind: FatalKind) -> &'static str {
    match kind {
        FatalKind::FileCheck => "Missing Files",
        FatalKind::CommandFailure => "Command Failures",
        FatalKind::SetupException => "Setup Errors",
    }
}

/// Pull the quoted filename out of a file_check message, falling back to
/// the raw message when the format does not match.
fn extract_filename(message: &str) -> &str {
    message.split('\'').nth(1).unwrap_or(message)
}
