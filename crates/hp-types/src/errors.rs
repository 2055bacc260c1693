use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the Hyperpipe system
#[derive(Error, Debug)]
pub enum HpError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Failed to write artifact {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Optimizer has not completed successfully")]
    NotOptimized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Component catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Component not found: {name}")]
    UnknownComponent { name: String },

    #[error("Invalid parameter {parameter} of {component}: {message}")]
    InvalidParameter {
        component: String,
        parameter: String,
        message: String,
    },

    #[error("Failed to read catalog {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
}

/// Unique parameter key errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("Not a unique parameter key: {key:?}")]
    InvalidKey { key: String },
}

/// External process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Trial log parsing and decoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("No trials recorded in {}", path.display())]
    NoTrials { path: PathBuf },

    #[error("Winning trial has no value for {key}")]
    MissingValue { key: String },

    #[error("Value {value:?} for {key} is not numeric")]
    InvalidValue { key: String, value: String },
}

/// Result type alias for Hyperpipe operations
pub type HpResult<T> = Result<T, HpError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HpError::Config(format!($($arg)*))
    };
}
