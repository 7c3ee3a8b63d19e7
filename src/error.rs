use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems with the run configuration, detected before any data is read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse configuration YAML from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while loading or persisting a dataset.
///
/// A configured column that the file does not carry is reported as
/// [`DatasetError::MissingColumn`] so callers never confuse it with a dataset
/// that simply has nothing left to fill.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("column '{column}' is not present in {path}")]
    MissingColumn { column: String, path: PathBuf },
    #[error("column '{column}' appears more than once in {path}")]
    DuplicateColumn { column: String, path: PathBuf },
    #[error("dataset {0} has no header row")]
    MissingHeader(PathBuf),
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}
