//! Execution contexts
//!
//! A context is a saved snapshot of `LiveState` plus bookkeeping, pushed
//! whenever execution enters a construct that must be able to restore the
//! previous state: loops, try/catch, function calls, nested scripts and
//! suspensions. Contexts live in a stack-disciplined arena owned by the
//! interpreter; `parent` is always the previous index.

use super::program::Program;
use super::token::{tok_attr, OPENER};
use super::values::Val;
use super::control::{ResumePoint, ResumptionKey};
use std::collections::HashMap;
use std::sync::Arc;

pub type ContextId = usize;

/* ===================== Branch table ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    /// No earlier clause of this chain has been taken
    Pending,
    /// An earlier clause ran; skip this one
    Taken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: usize,
    pub state: BranchState,
}

/// Per-activation jump edges and branch bookkeeping.
///
/// Built fresh for every activation of a program so recursive or
/// concurrent activations never share clause state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchTable {
    edges: Vec<Option<Edge>>,
    /// Pending `switch` subjects keyed by switch pc; removed once a case matches
    pub switch_subjects: HashMap<usize, Val>,
    /// Error text waiting for the `catch` at the given pc
    pub caught: HashMap<usize, String>,
}

impl BranchTable {
    pub fn for_program(program: &Program) -> Self {
        let edges = program
            .statements
            .iter()
            .map(|st| {
                let head = st.head()?;
                if !tok_attr(head.tok, OPENER) {
                    return None;
                }
                head.target().map(|target| Edge {
                    target,
                    state: BranchState::Pending,
                })
            })
            .collect();
        BranchTable {
            edges,
            ..Default::default()
        }
    }

    pub fn target(&self, pc: usize) -> Option<usize> {
        self.edges.get(pc).copied().flatten().map(|e| e.target)
    }

    pub fn state(&self, pc: usize) -> BranchState {
        self.edges
            .get(pc)
            .copied()
            .flatten()
            .map(|e| e.state)
            .unwrap_or(BranchState::Pending)
    }

    pub fn set_state(&mut self, pc: usize, state: BranchState) {
        if let Some(Some(edge)) = self.edges.get_mut(pc) {
            edge.state = state;
        }
    }
}

/* ===================== Loop state ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum LoopCursor {
    /// Remaining values of a collection loop
    Items { items: Vec<Val>, next: usize },
    /// Inclusive integer range; `next` is `None` once `end` was emitted
    Range { next: Option<i64>, end: i64, step: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopState {
    /// pc of the owning `for`
    pub opener: usize,
    pub var: String,
    pub cursor: LoopCursor,
}

/* ===================== Live state ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorState {
    pub message: String,
    pub line: usize,
}

/// Everything about "where we are" that a context saves and restores
#[derive(Debug, Clone)]
pub struct LiveState {
    pub program: Arc<Program>,
    pub pc: usize,
    pub branches: BranchTable,
    pub loop_state: Option<LoopState>,
    /// Set when control re-enters a loop opener from its `end` or a `continue`
    pub for_check: bool,
    pub function_name: Option<String>,
    pub quiet: bool,
    /// Most recently caught error
    pub error: Option<ErrorState>,
}

impl LiveState {
    pub fn new(program: Arc<Program>) -> Self {
        let branches = BranchTable::for_program(&program);
        LiveState {
            program,
            pc: 0,
            branches,
            loop_state: None,
            for_check: false,
            function_name: None,
            quiet: false,
            error: None,
        }
    }

    /// Switch to a different program, starting at its first statement
    pub fn enter_program(&mut self, program: Arc<Program>) {
        self.branches = BranchTable::for_program(&program);
        self.program = program;
        self.pc = 0;
        self.loop_state = None;
        self.for_check = false;
    }
}

/* ===================== Contexts ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextReason {
    /// Explicit `push` command
    Push,
    /// Nested `script` load
    Script,
    Function,
    While,
    For,
    Try,
    Catch,
    /// Parked execution awaiting `resume`
    Suspend,
}

impl ContextReason {
    /// Frames whose pop returns to a different program
    pub fn swaps_program(&self) -> bool {
        matches!(self, ContextReason::Function | ContextReason::Script)
    }

    /// Frames popped by break/continue/return unwinding
    pub fn is_flow(&self) -> bool {
        matches!(
            self,
            ContextReason::While
                | ContextReason::For
                | ContextReason::Try
                | ContextReason::Catch
                | ContextReason::Push
        )
    }

    pub fn opens_scope(&self) -> bool {
        !matches!(self, ContextReason::Script | ContextReason::Suspend)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextReason::Push => "push",
            ContextReason::Script => "script",
            ContextReason::Function => "function",
            ContextReason::While => "while",
            ContextReason::For => "for",
            ContextReason::Try => "try",
            ContextReason::Catch => "catch",
            ContextReason::Suspend => "suspend",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFlags {
    pub is_try_catch: bool,
    pub is_function: bool,
    pub is_loop: bool,
    /// Parked by a suspension; only `resume` may pop it
    pub must_resume: bool,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    pub reason: ContextReason,
    pub flags: ContextFlags,
    pub saved: LiveState,
    /// Scope frames present before the push
    pub scope_len: usize,
    /// pc of the flow statement that pushed this context
    pub opener: Option<usize>,
    /// Set on suspension contexts
    pub resumption: Option<(ResumptionKey, ResumePoint)>,
}

/// How much of a context `pop_context` restores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopMode {
    /// Restore everything, including the statement cursor
    Full,
    /// Restore everything except the statement cursor, used when leaving a
    /// flow construct forward
    Flow,
    /// Restore only the statement cursor and leave the context linked
    StatementOnly,
}

/* ===================== Scopes ===================== */

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeFrame {
    pub vars: HashMap<String, Val>,
    /// Lookups do not continue past a function frame into its caller
    pub isolates: bool,
}
