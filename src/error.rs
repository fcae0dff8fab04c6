use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::data::model::ConfigValue;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown configuration key {0:?}")]
    UnknownKey(String),
    #[error("Invalid value {value} for configuration key {key:?}")]
    InvalidValue { key: String, value: ConfigValue },
}

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Configuration file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Configuration file failed to parse JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("Concurrent observations of {variable:?} at {timestamp} and no duplicate policy was given")]
    AmbiguousMerge {
        variable: String,
        timestamp: NaiveDateTime,
    },
    #[error("Variable {0:?} not found in data set")]
    VariableNotFound(String),
    #[error("No observation of {variable:?} found near {timestamp}")]
    ObservationNotFound {
        variable: String,
        timestamp: NaiveDateTime,
    },
    #[error("Row at {timestamp} has {found} values but the table has {expected} columns")]
    RowLengthMismatch {
        timestamp: NaiveDateTime,
        expected: usize,
        found: usize,
    },
    #[error("Timestamp {0} appears more than once")]
    DuplicateTimestamp(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvmDataError {
    #[error("ADVM data sets are incompatible")]
    IncompatibleData,
    #[error("Configuration parameter {0:?} is not set")]
    MissingConfiguration(&'static str),
    #[error("ADVM data failed due to data set error: {0}")]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Could not read data set because file {0:?} does not exist")]
    FileNotFound(PathBuf),
    #[error("Malformed header in {path:?}: {detail}")]
    MalformedHeader { path: PathBuf, detail: String },
    #[error("Malformed row {line} in {path:?}: {detail}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        detail: String,
    },
    #[error("Reader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Reader failed due to CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Reader failed due to Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
    #[error("Reader failed due to Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
    #[error("Reader failed due to configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Reader failed due to data set error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Unsupported table format for file {0:?}")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Writer failed due to CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Writer failed due to Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
    #[error("Writer failed due to Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
    #[error("Timestamp {0} cannot be stored as nanoseconds since the epoch")]
    TimestampOutOfRange(NaiveDateTime),
}
