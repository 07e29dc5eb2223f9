//! Statement executor
//!
//! A program is a flat list of token statements. The interpreter walks it
//! with an explicit statement index; nested constructs are tracked by a
//! chain of saved contexts rather than the Rust call stack, which is what
//! lets a run be parked at any statement boundary and resumed later.

pub mod commands;
pub mod control;
pub mod exec_loop;
pub mod expressions;
pub mod statements;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

pub use commands::{CommandHandler, CommandRegistry, ShapeHandler};
pub use control::EngineControl;
pub use exec_loop::{call_function, context_trace, resume_program, run_program, step};
pub use types::*;
pub use vm::Interpreter;
