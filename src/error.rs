//! Error types for translation and for the driver around it.
//!
//! Every failure is fatal: nothing is retried and no partial output is kept.

use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Segment;

pub type Result<T> = std::result::Result<T, TranslateError>;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("{file}:{line}: unrecognized command '{text}'")]
    UnknownCommand {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file}:{line}: malformed command '{text}': {reason}")]
    Malformed {
        file: String,
        line: usize,
        text: String,
        reason: String,
    },

    #[error("invalid operand '{operand}': {reason}")]
    InvalidOperand {
        operand: String,
        reason: &'static str,
    },

    #[error("{file}:{line}: {error}")]
    AtLine {
        file: String,
        line: usize,
        error: Box<TranslateError>,
    },

    #[error("invalid source file name {path}: {reason}")]
    InvalidFileName { path: PathBuf, reason: &'static str },

    #[error("no .vm files found in {path}")]
    NoSources { path: PathBuf },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TranslateError {
    pub(crate) fn invalid_operand(segment: Segment, index: i64, reason: &'static str) -> Self {
        TranslateError::InvalidOperand {
            operand: format!("{} {}", segment, index),
            reason,
        }
    }

    pub(crate) fn invalid_count(keyword: &str, name: &str, count: u16, reason: &'static str) -> Self {
        TranslateError::InvalidOperand {
            operand: format!("{} {} {}", keyword, name, count),
            reason,
        }
    }

    /// Anchors an error raised while generating code to its source line.
    /// Errors that already carry a location pass through untouched.
    pub(crate) fn at_line(self, file: &str, line: usize) -> Self {
        match self {
            TranslateError::InvalidOperand { .. } => TranslateError::AtLine {
                file: file.to_string(),
                line,
                error: Box::new(self),
            },
            other => other,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TranslateError::Io {
            path: path.into(),
            source,
        }
    }
}
