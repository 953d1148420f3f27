//! Exit-code taxonomy and error types for the helper's fallible subsystems.
//!
//! The process-level exit codes are part of the external interface (proxy
//! operators script around them), so they are kept as a flat, explicit
//! mapping rather than derived from a generic error hierarchy.

use thiserror::Error;

/// Exit codes returned by `main`. Values match the external interface
/// exactly; do not renumber without updating operator-facing docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    BadOptions = 1,
    ConfigError = 2,
    PidfileOrPrivilege = 3,
    PrivilegeSplit = 4,
    SourcesInit = 10,
    OptionsInit = 11,
    SslInit = 12,
    GeoipInit = 13,
    CheckersInit = 14,
    RequestLoop = 99,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

/// Errors arising while reading and validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path}:{line}: {message}")]
    Syntax {
        path: String,
        line: usize,
        message: String,
    },
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("value out of range for '{key}': {value}")]
    OutOfRange { key: String, value: String },
    #[error("unknown driver '{0}'")]
    UnknownDriver(String),
    #[error("duplicate name '{0}'")]
    DuplicateName(String),
    #[error("io error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors a data source can raise while producing its text buffer. These
/// are never fatal: the caller logs and treats the component as empty.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("memcached source is not supported")]
    Unsupported,
    #[error("query failed: {0}")]
    Query(String),
}
