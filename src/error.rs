use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BppError {
    #[error("Failed to {operation} '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed probability plot '{}' at line {line}: {detail}", .path.display())]
    DataFormat {
        path: PathBuf,
        line: usize,
        detail: String,
    },
    #[error("Dimension mismatch in {context}: {left} vs {right}")]
    DimensionMismatch {
        context: String,
        left: usize,
        right: usize,
    },
    #[error("{metric} is undefined: {reason}")]
    UndefinedMetric {
        metric: &'static str,
        reason: String,
    },
    #[error("External tool step '{step}' failed: {detail}")]
    ToolExecution { step: &'static str, detail: String },
    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, BppError>;

impl BppError {
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        BppError::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    pub fn data_format(path: impl Into<PathBuf>, line: usize, detail: impl Into<String>) -> Self {
        BppError::DataFormat {
            path: path.into(),
            line,
            detail: detail.into(),
        }
    }

    pub fn dimension_mismatch(context: impl Into<String>, left: usize, right: usize) -> Self {
        BppError::DimensionMismatch {
            context: context.into(),
            left,
            right,
        }
    }

    pub fn undefined(metric: &'static str, reason: impl Into<String>) -> Self {
        BppError::UndefinedMetric {
            metric,
            reason: reason.into(),
        }
    }

    pub fn tool(step: &'static str, detail: impl Into<String>) -> Self {
        BppError::ToolExecution {
            step,
            detail: detail.into(),
        }
    }
}
