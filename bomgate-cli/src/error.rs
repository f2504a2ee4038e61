//! CLI-specific error types and exit code mapping

use bomgate_core::error::BomgateError;
use bomgate_ingest::IngestError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// At least one upload ended in `Failed`.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from bomgate-core.
    #[error("{0}")]
    Core(#[from] BomgateError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                     |
    /// |------|-----------------------------|
    /// | 0    | Success                     |
    /// | 1    | General / command error     |
    /// | 2    | Configuration error         |
    /// | 4    | An upload failed            |
    /// | 10   | IO error                    |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(BomgateError::Config(_)) => 2,
            Self::Ingest(_) => 4,
            Self::Io(_) | Self::Core(BomgateError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<IngestError> for CliError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Ingest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bomgate_core::error::ConfigError;

    #[test]
    fn exit_code_config_error() {
        assert_eq!(CliError::Config("bad".to_owned()).exit_code(), 2);
    }

    #[test]
    fn exit_code_core_config_error() {
        let err = CliError::Core(BomgateError::Config(ConfigError::FileNotFound {
            path: "bomgate.toml".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn exit_code_ingest_error() {
        assert_eq!(CliError::Ingest("1 upload failed".to_owned()).exit_code(), 4);
    }

    #[test]
    fn exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn exit_code_command_error() {
        assert_eq!(CliError::Command("nope".to_owned()).exit_code(), 1);
    }

    #[test]
    fn ingest_config_error_maps_to_config() {
        let err: CliError = IngestError::Config {
            field: "workers".to_owned(),
            reason: "must be 1-256".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn ingest_domain_error_maps_to_ingest() {
        let err: CliError = IngestError::parse("cyclonedx-json", "eof").into();
        assert!(matches!(err, CliError::Ingest(_)));
        assert!(err.to_string().contains("eof"));
    }

    #[test]
    fn display_includes_context() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let display = err.to_string();
        assert!(display.contains("configuration error"));
        assert!(display.contains("invalid TOML syntax"));
    }
}
