//! Type definitions for the executor

pub mod ast;
pub mod context;
pub mod control;
pub mod program;
pub mod token;
pub mod values;

pub use ast::{Assignment, BinOp, Expr, ForClause, LValue, UnaryOp};
pub use context::{
    BranchState, BranchTable, Context, ContextFlags, ContextId, ContextReason, Edge, ErrorState,
    LiveState, LoopCursor, LoopState, PopMode, ScopeFrame,
};
pub use control::{
    ChainHandle, Completion, ResumePoint, ResumptionKey, RunOutcome, StepResult, SuspendReason,
    SuspendRequest, Suspension,
};
pub use program::{FunctionDef, Program, Statement};
pub use token::{tok_attr, Payload, Tok, Token};
pub use values::Val;
