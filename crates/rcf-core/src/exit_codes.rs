//! Exit codes for the `rcf` CLI.
//!
//! Exit code ranges:
//! - 0-1: Operational outcomes
//! - 10-19: User/input errors (recoverable by user action)
//! - 20-29: I/O and internal errors

use rcf_common::{Error, ErrorCategory};

/// Process exit codes. Stable for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-1)
    // ========================================================================
    /// Run completed, nothing anomalous
    Clean = 0,

    /// Run completed and at least one point was flagged
    AnomaliesFound = 1,

    // ========================================================================
    // User Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Invalid configuration or config file
    ConfigError = 11,

    /// Unparseable or rejected input
    InputError = 12,

    /// Model file corrupt, tampered with, or from another schema
    ModelError = 13,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// I/O error
    IoError = 20,

    /// Internal error (bug)
    InternalError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-1: the command ran to completion.
    pub fn is_success(self) -> bool {
        (self as i32) < 10
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Codes 20 and above.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Error code name (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::AnomaliesFound => "OK_ANOMALIES",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::ModelError => "ERR_MODEL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Input => ExitCode::InputError,
            ErrorCategory::Model => ExitCode::ModelError,
            ErrorCategory::Io => match err {
                // A model file that is not JSON is a model problem.
                Error::Json(_) => ExitCode::ModelError,
                _ => ExitCode::IoError,
            },
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::AnomaliesFound.as_i32(), 1);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::InputError.as_i32(), 12);
        assert_eq!(ExitCode::ModelError.as_i32(), 13);
        assert_eq!(ExitCode::IoError.as_i32(), 20);
        assert_eq!(ExitCode::InternalError.as_i32(), 21);
    }

    #[test]
    fn test_ranges() {
        assert!(ExitCode::AnomaliesFound.is_success());
        assert!(ExitCode::InputError.is_user_error());
        assert!(!ExitCode::InputError.is_internal_error());
        assert!(ExitCode::IoError.is_internal_error());
    }

    #[test]
    fn test_from_error() {
        let cases = [
            (Error::Configuration("x".into()), ExitCode::ConfigError),
            (
                Error::DimensionMismatch {
                    expected: 2,
                    actual: 1,
                },
                ExitCode::InputError,
            ),
            (Error::Serialization("x".into()), ExitCode::ModelError),
            (
                Error::Io(std::io::Error::other("disk")),
                ExitCode::IoError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ExitCode::from(&err), code, "{err}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::ModelError.to_string(), "ERR_MODEL (13)");
    }
}
