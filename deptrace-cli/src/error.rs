//! CLI-specific error types and exit code mapping

use deptrace_core::error::DeptraceError;
use deptrace_engine::EngineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from deptrace-core.
    #[error("{0}")]
    Core(#[from] DeptraceError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | General / command error         |
    /// | 2    | Configuration error             |
    /// | 3    | Origin unavailable / scan fatal |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(DeptraceError::Config(_)) => 2,
            Self::Core(DeptraceError::Scan(_)) => 3,
            Self::Command(_) | Self::JsonSerialize(_) | Self::Io(_) | Self::Core(_) => 1,
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        Self::Core(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deptrace_core::error::{ConfigError, ScanError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(CliError::Io(io_err).exit_code(), 1);
    }

    #[test]
    fn test_exit_code_follows_core_category() {
        let config: CliError = DeptraceError::Config(ConfigError::ParseFailed {
            reason: "bad".to_owned(),
        })
        .into();
        assert_eq!(config.exit_code(), 2);

        let scan: CliError = DeptraceError::Scan(ScanError::Cancelled).into();
        assert_eq!(scan.exit_code(), 3);

        let io: CliError = DeptraceError::Io(std::io::Error::other("x")).into();
        assert_eq!(io.exit_code(), 1);
    }

    #[test]
    fn test_from_engine_error() {
        let err: CliError = EngineError::UnsupportedScheme {
            scheme: "ftp".to_owned(),
            origin: "ftp://host/a.zip".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("ftp"));

        let err: CliError = EngineError::UnknownAnalyzer {
            name: "maven".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_error_display_config() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let display_str = err.to_string();
        assert!(display_str.contains("configuration error"));
        assert!(display_str.contains("invalid TOML syntax"));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.to_string(), "execution failed");
    }
}
