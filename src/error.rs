//! Exit codes and structured error reports.

use serde::Serialize;

/// Exit codes of the linkdupe binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The command completed.
    Success = 0,
    /// The command failed or was refused.
    GeneralError = 1,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "LD000",
            Self::GeneralError => "LD001",
        }
    }
}

/// Error report printed with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "LD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Messages of the underlying causes, outermost first
    pub causes: Vec<String>,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}
