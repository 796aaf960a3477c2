use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Startup configuration failures. These are the only fatal errors; everything
/// else is confined to the cycle or connection attempt it happened in.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("zpool command not found at {}", .0.display())]
    CommandMissing(PathBuf),

    #[error("zpool.columns must start with \"name\"")]
    ColumnsWithoutName,
}

/// Failures invoking the pool-status command.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot run zpool: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("zpool exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("zpool did not finish within {0:?}")]
    Timeout(Duration),

    #[error("zpool produced non-UTF-8 output")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Malformed pool-status output. The whole invocation is rejected so a
/// partial pool set is never published as if it were current.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: empty pool name")]
    EmptyName { line: usize },

    #[error("line {line}: duplicate pool {name:?}")]
    DuplicatePool { line: usize, name: String },
}
