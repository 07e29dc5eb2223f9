//! Error types
//!
//! `EngineError` is what the executor propagates internally with `?`.
//! `ScriptError` is the value handed back to the embedder once an error
//! escapes every try/catch: it carries a context trace built from the
//! active context chain at the moment of failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/* ===================== Engine errors ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("compile error at line {line}: {message}")]
    Compile { message: String, line: usize },

    #[error("{message}")]
    Runtime {
        message: String,
        pc: usize,
        line: usize,
    },

    #[error("{message}")]
    Thrown {
        message: String,
        pc: usize,
        line: usize,
    },

    #[error("too many nested contexts (depth {depth}, limit {max})")]
    NestingLimitExceeded { depth: usize, max: usize },

    #[error("execution interrupted")]
    Interrupted,

    #[error("not resumable: {0}")]
    NotResumable(String),

    #[error("engine is busy with a suspended script")]
    Busy,
}

impl EngineError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Compile { .. } => "COMPILE_ERROR",
            EngineError::Runtime { .. } => "RUNTIME_ERROR",
            EngineError::Thrown { .. } => "THROWN",
            EngineError::NestingLimitExceeded { .. } => "NESTING_LIMIT",
            EngineError::Interrupted => "INTERRUPTED",
            EngineError::NotResumable(_) => "NOT_RESUMABLE",
            EngineError::Busy => "BUSY",
        }
    }

    /// Whether a try/catch may intercept this error.
    ///
    /// Resource-limit and halt errors always unwind to the embedder.
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            EngineError::Compile { .. } | EngineError::Runtime { .. } | EngineError::Thrown { .. }
        )
    }

    /// Text bound to a catch variable.
    pub fn catch_message(&self) -> String {
        match self {
            EngineError::Thrown { message, .. } | EngineError::Runtime { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            EngineError::Compile { line, .. }
            | EngineError::Runtime { line, .. }
            | EngineError::Thrown { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub fn pc(&self) -> Option<usize> {
        match self {
            EngineError::Runtime { pc, .. } | EngineError::Thrown { pc, .. } => Some(*pc),
            _ => None,
        }
    }
}

/* ===================== Script errors ===================== */

/// One line of a context trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLine {
    pub program: String,
    pub function: Option<String>,
    pub line: usize,
    pub statement: String,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(
                f,
                "  in {}() [{}:{}] {}",
                name, self.program, self.line, self.statement
            ),
            None => write!(f, "  at [{}:{}] {}", self.program, self.line, self.statement),
        }
    }
}

/// Error reported to the embedder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptError {
    pub code: String,
    pub message: String,
    pub line: Option<usize>,
    pub pc: Option<usize>,
    /// Innermost first
    pub trace: Vec<TraceLine>,
}

impl ScriptError {
    pub fn from_engine(err: &EngineError, trace: Vec<TraceLine>) -> Self {
        ScriptError {
            code: err.code().to_string(),
            message: err.to_string(),
            line: err.line(),
            pc: err.pc(),
            trace,
        }
    }
}

impl From<EngineError> for ScriptError {
    fn from(err: EngineError) -> Self {
        ScriptError::from_engine(&err, Vec::new())
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}
