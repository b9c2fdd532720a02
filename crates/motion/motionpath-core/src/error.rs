//! Error type shared by every stage of the editing pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while importing, editing, solving or blending motions.
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("bvh parse error{}: line {line}: {message}", display_path(.path))]
    Parse {
        path: Option<PathBuf>,
        line: usize,
        message: String,
    },
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("degenerate chain: bone {bone} has length {length}")]
    DegenerateChain { bone: usize, length: f64 },
    #[error("skeleton mismatch: {0}")]
    SkeletonMismatch(String),
    #[error("unknown joint '{0}'")]
    UnknownJoint(String),
    #[error("unknown motion '{0}'")]
    UnknownMotion(String),
    #[error("unknown registration '{0}'")]
    UnknownRegistration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("registration of {frames_a}x{frames_b} frames exceeds the limit of {limit}")]
    RegistrationTooLarge {
        frames_a: usize,
        frames_b: usize,
        limit: usize,
    },
    #[error("config error: {0}")]
    Config(String),
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" in {}", p.display()),
        None => String::new(),
    }
}

impl MotionError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        MotionError::Parse {
            path: None,
            line,
            message: message.into(),
        }
    }

    /// Attach a file path to a parse error produced from in-memory text.
    pub(crate) fn with_path(self, file: PathBuf) -> Self {
        match self {
            MotionError::Parse { line, message, .. } => MotionError::Parse {
                path: Some(file),
                line,
                message,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, MotionError>;
