//! Interpreter state
//!
//! The interpreter holds everything needed to execute and resume a run:
//! - live: the current program, statement index and flow bookkeeping
//! - contexts: the saved-state chain, innermost last
//! - scopes: local variable frames, globals underneath
//!
//! ## Push/pop
//! `push_context` snapshots `live` into a new context and, for constructs
//! that open a lexical scope, adds a scope frame. `pop_context` restores
//! from the top context according to a `PopMode`. Depth is the number of
//! contexts and never exceeds `max_context_depth`.

use super::commands::CommandRegistry;
use super::control::EngineControl;
use super::types::{
    ChainHandle, Context, ContextFlags, ContextId, ContextReason, LiveState, PopMode, Program,
    ResumePoint, ResumptionKey, ScopeFrame, Val,
};
use crate::compiler::ProgramCache;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::host::{Host, Threading};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/* ===================== Interpreter ===================== */

pub struct Interpreter {
    pub config: EngineConfig,
    pub live: LiveState,
    pub contexts: Vec<Context>,
    pub scopes: Vec<ScopeFrame>,
    pub globals: HashMap<String, Val>,
    pub functions: HashMap<String, Arc<super::types::FunctionDef>>,

    /// Printed lines, in order
    pub output: Vec<String>,
    /// Recently executed command lines, oldest first
    pub history: VecDeque<String>,
    /// Completions delivered by `resume`, consumed by the replayed statement
    pub load_cache: HashMap<ResumptionKey, Result<String, String>>,

    pub control: EngineControl,
    pub host: Arc<dyn Host>,
    pub commands: Arc<CommandRegistry>,
    pub programs: ProgramCache,

    /// Cleared while a nested run (function inside an expression) executes
    pub(crate) suspend_allowed: bool,
    pub(crate) exit_requested: bool,
    pub(crate) epoch: u64,
    pub(crate) last_yield: Instant,
}

impl Interpreter {
    pub fn new(config: EngineConfig, host: Arc<dyn Host>, commands: Arc<CommandRegistry>) -> Self {
        Interpreter {
            config,
            live: LiveState::new(Arc::new(Program::empty("(none)"))),
            contexts: Vec::new(),
            scopes: Vec::new(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            output: Vec::new(),
            history: VecDeque::new(),
            load_cache: HashMap::new(),
            control: EngineControl::new(),
            host,
            commands,
            programs: ProgramCache::default(),
            suspend_allowed: true,
            exit_requested: false,
            epoch: 0,
            last_yield: Instant::now(),
        }
    }

    pub fn threading(&self) -> Threading {
        self.host.threading()
    }

    /// Start a fresh run of `program` with an empty context chain
    pub fn load_program(&mut self, program: Arc<Program>) {
        self.contexts.clear();
        self.scopes.clear();
        self.load_cache.clear();
        self.live = LiveState::new(program);
        self.suspend_allowed = true;
        self.exit_requested = false;
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn top(&self) -> Option<&Context> {
        self.contexts.last()
    }

    /// True while a suspended chain is waiting for `resume`
    pub fn is_suspended(&self) -> bool {
        self.top().map(|c| c.flags.must_resume).unwrap_or(false)
    }

    /* ===================== Push / Pop ===================== */

    /// Save the live state into a new context.
    ///
    /// Fails without changing anything when the chain is already at the
    /// configured depth limit.
    pub fn push_context(
        &mut self,
        reason: ContextReason,
        opener: Option<usize>,
        locals: &[String],
    ) -> Result<ContextId, EngineError> {
        let max = self.config.max_context_depth;
        if self.contexts.len() >= max {
            return Err(EngineError::NestingLimitExceeded {
                depth: self.contexts.len(),
                max,
            });
        }
        let id = self.link_context(reason, opener, None);
        if reason.opens_scope() {
            let vars = locals.iter().map(|name| (name.clone(), Val::Null)).collect();
            self.scopes.push(ScopeFrame {
                vars,
                isolates: reason == ContextReason::Function,
            });
        }
        Ok(id)
    }

    /// Park the live state for a later `resume`.
    ///
    /// Suspension is not subject to the depth limit.
    pub(crate) fn push_suspend(
        &mut self,
        key: ResumptionKey,
        resume_at: ResumePoint,
    ) -> ChainHandle {
        let head = self.link_context(ContextReason::Suspend, None, Some((key, resume_at)));
        self.epoch += 1;
        ChainHandle {
            head,
            epoch: self.epoch,
        }
    }

    fn link_context(
        &mut self,
        reason: ContextReason,
        opener: Option<usize>,
        resumption: Option<(ResumptionKey, ResumePoint)>,
    ) -> ContextId {
        let id = self.contexts.len();
        let flags = ContextFlags {
            is_try_catch: reason == ContextReason::Try,
            is_function: reason == ContextReason::Function,
            is_loop: matches!(reason, ContextReason::While | ContextReason::For),
            must_resume: reason == ContextReason::Suspend,
        };
        debug!(
            id,
            reason = reason.as_str(),
            pc = self.live.pc,
            "push context"
        );
        self.contexts.push(Context {
            id,
            parent: id.checked_sub(1),
            reason,
            flags,
            saved: self.live.clone(),
            scope_len: self.scopes.len(),
            opener,
            resumption,
        });
        id
    }

    /// Restore from the top context. Returns the popped (or, for
    /// `StatementOnly`, inspected) context's reason.
    pub fn pop_context(&mut self, mode: PopMode) -> Option<ContextReason> {
        if mode == PopMode::StatementOnly {
            let top = self.contexts.last()?;
            self.live.pc = top.saved.pc;
            self.live.for_check = top.saved.for_check;
            return Some(top.reason);
        }

        let ctx = self.contexts.pop()?;
        debug!(id = ctx.id, reason = ctx.reason.as_str(), ?mode, "pop context");
        self.scopes.truncate(ctx.scope_len);
        match mode {
            PopMode::Full => {
                self.live = ctx.saved;
            }
            PopMode::Flow => {
                let pc = self.live.pc;
                let for_check = self.live.for_check;
                let quiet = self.live.quiet;
                let branches = std::mem::take(&mut self.live.branches);
                self.live = ctx.saved;
                self.live.pc = pc;
                self.live.for_check = for_check;
                self.live.quiet = quiet;
                self.live.branches = branches;
            }
            PopMode::StatementOnly => {}
        }
        Some(ctx.reason)
    }

    /// Drop the whole chain, e.g. after an uncaught error
    pub fn clear_contexts(&mut self) {
        if !self.contexts.is_empty() {
            debug!(depth = self.contexts.len(), "clearing context chain");
        }
        self.contexts.clear();
        self.scopes.clear();
    }

    /// Index of the innermost context satisfying `pred` at or above `base`
    pub fn find_context(&self, base: usize, pred: impl Fn(&Context) -> bool) -> Option<usize> {
        self.contexts
            .iter()
            .enumerate()
            .skip(base)
            .rev()
            .find(|(_, c)| pred(c))
            .map(|(i, _)| i)
    }

    /* ===================== Variables ===================== */

    /// Scope frames visible from the current position, innermost first
    fn visible_scopes(&self) -> impl Iterator<Item = usize> + '_ {
        let floor = self
            .scopes
            .iter()
            .rposition(|s| s.isolates)
            .unwrap_or(0);
        (floor..self.scopes.len()).rev()
    }

    pub fn lookup(&self, name: &str) -> Option<&Val> {
        for i in self.visible_scopes() {
            if let Some(v) = self.scopes[i].vars.get(name) {
                return Some(v);
            }
        }
        self.globals.get(name)
    }

    /// Assign to the nearest visible binding, or create a global
    pub fn assign(&mut self, name: &str, value: Val) {
        let found = self
            .visible_scopes()
            .find(|&i| self.scopes[i].vars.contains_key(name));
        match found {
            Some(i) => {
                self.scopes[i].vars.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Bind in the innermost scope (globals at top level)
    pub fn declare(&mut self, name: &str, value: Val) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.vars.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /* ===================== Helpers ===================== */

    /// Runtime error located at the current statement
    pub fn runtime_error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Runtime {
            message: message.into(),
            pc: self.live.pc,
            line: self.live.program.line(self.live.pc),
        }
    }

    pub fn print(&mut self, line: String) {
        if self.live.quiet {
            return;
        }
        self.host.echo(&line);
        self.output.push(line);
    }

    pub(crate) fn record_history(&mut self, text: String) {
        if self.config.history_size == 0 || text.is_empty() {
            return;
        }
        while self.history.len() >= self.config.history_size {
            self.history.pop_front();
        }
        self.history.push_back(text);
    }
}
