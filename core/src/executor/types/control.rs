//! Control flow and suspension types

use super::context::ContextId;
use crate::errors::ScriptError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/* ===================== Step results ===================== */

/// What the dispatch loop does after one statement
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Advance to the next statement
    Continue,
    /// Continue at this statement index
    Jump(usize),
    /// Park the run and hand control back to the caller
    Suspend(SuspendRequest),
    /// Stop the run (`exit`)
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumePoint {
    /// Continue after the suspending statement
    Advance,
    /// Re-execute the suspending statement
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SuspendReason {
    Delay,
    Load { path: String },
    /// Periodic cooperative yield
    Yield,
    Pause,
}

impl SuspendReason {
    pub fn op(&self) -> &'static str {
        match self {
            SuspendReason::Delay => "delay",
            SuspendReason::Load { .. } => "script",
            SuspendReason::Yield => "yield",
            SuspendReason::Pause => "pause",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuspendRequest {
    pub reason: SuspendReason,
    pub delay: Option<Duration>,
    pub resume_at: ResumePoint,
}

impl SuspendRequest {
    pub fn delay(duration: Duration) -> Self {
        SuspendRequest {
            reason: SuspendReason::Delay,
            delay: Some(duration),
            resume_at: ResumePoint::Advance,
        }
    }

    pub fn load(path: impl Into<String>) -> Self {
        SuspendRequest {
            reason: SuspendReason::Load { path: path.into() },
            delay: None,
            resume_at: ResumePoint::Replay,
        }
    }

    pub fn yield_now() -> Self {
        SuspendRequest {
            reason: SuspendReason::Yield,
            delay: Some(Duration::ZERO),
            resume_at: ResumePoint::Replay,
        }
    }

    pub fn pause() -> Self {
        SuspendRequest {
            reason: SuspendReason::Pause,
            delay: None,
            resume_at: ResumePoint::Replay,
        }
    }
}

/* ===================== Resumption ===================== */

/// Identifies the operation a suspension is waiting on.
///
/// Derived from the program, statement index and operation name, so a
/// replayed statement computes the same key and can find its completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumptionKey {
    pub program: String,
    pub pc: usize,
    pub op: String,
}

impl ResumptionKey {
    pub fn new(program: &str, pc: usize, op: &str) -> Self {
        ResumptionKey {
            program: program.to_string(),
            pc,
            op: op.to_string(),
        }
    }
}

impl fmt::Display for ResumptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.program, self.pc, self.op)
    }
}

/// Opaque reference to a suspended context chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainHandle {
    pub(crate) head: ContextId,
    pub(crate) epoch: u64,
}

/// Result delivered by the host when resuming
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// A delay or yield elapsed
    Elapsed,
    /// A requested file finished loading
    Loaded(String),
    /// The requested operation failed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    pub handle: ChainHandle,
    pub key: ResumptionKey,
    pub reason: SuspendReason,
    pub delay: Option<Duration>,
}

/* ===================== Outcomes ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Pending(Suspension),
    Error(ScriptError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        match self {
            RunOutcome::Pending(s) => Some(s),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ScriptError> {
        match self {
            RunOutcome::Error(e) => Some(e),
            _ => None,
        }
    }
}
