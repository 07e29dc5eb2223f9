//! Stanza: an embeddable command-script engine
//!
//! The engine executes compiled statement programs with a context (frame)
//! stack, structured flow control, and suspend/resume so that scripts can
//! run either on a dedicated thread or cooperatively on a host event loop.
//!
//! ## Layout
//! - `compiler`: reference compiler from script text to token programs
//! - `executor`: dispatch loop, context stack, flow-control state machine
//! - `engine`: the public embedding surface (`Engine`)
//! - `queue`: FIFO scheduler for submitted scripts
//! - `host`: threading capabilities supplied by the embedder

pub mod cli;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod host;
pub mod queue;

// Re-export main types
pub use config::{Config, EngineConfig, QueueConfig};
pub use engine::Engine;
pub use errors::{EngineError, ScriptError, TraceLine};
pub use executor::{
    ChainHandle, CommandHandler, CommandRegistry, Completion, EngineControl, ResumptionKey,
    RunOutcome, ShapeHandler, SuspendReason, Suspension, Val,
};
pub use host::{CooperativeHost, Host, MemoryHost, ThreadedHost, Threading};
pub use queue::{run_worker, QueueResult, ScriptQueue, SubmissionId, SubmissionStatus};
