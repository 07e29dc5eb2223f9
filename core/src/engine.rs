//! Embedding surface
//!
//! ```rust,ignore
//! use stanza_core::{Engine, EngineConfig, RunOutcome, ThreadedHost};
//! use std::sync::Arc;
//!
//! let mut engine = Engine::new(EngineConfig::default(), Arc::new(ThreadedHost));
//! match engine.compile_and_run("x = 1\nprint x + 1") {
//!     RunOutcome::Completed => {}
//!     RunOutcome::Pending(s) => { /* complete s.reason, then engine.resume(s.handle, ..) */ }
//!     RunOutcome::Error(e) => eprintln!("{}", e),
//! }
//! ```

use crate::compiler;
use crate::config::EngineConfig;
use crate::errors::{EngineError, TraceLine};
use crate::executor::{
    self, ChainHandle, CommandRegistry, Completion, EngineControl, Interpreter, Program,
    RunOutcome, Val,
};
use crate::host::Host;
use std::sync::Arc;

pub struct Engine {
    interp: Interpreter,
}

impl Engine {
    pub fn new(config: EngineConfig, host: Arc<dyn Host>) -> Self {
        Self::with_registry(config, host, Arc::new(CommandRegistry::with_builtins()))
    }

    /// Engine whose scripts may use host-registered commands
    pub fn with_registry(
        config: EngineConfig,
        host: Arc<dyn Host>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Engine {
            interp: Interpreter::new(config, host, registry),
        }
    }

    pub fn compile(&self, name: &str, source: &str) -> Result<Program, EngineError> {
        compiler::compile(name, source, self.interp.commands.vocabulary())
    }

    pub fn compile_and_run(&mut self, source: &str) -> RunOutcome {
        let vocabulary = self.interp.commands.clone();
        match self
            .interp
            .programs
            .get_or_compile("script", source, vocabulary.vocabulary())
        {
            Ok(program) => self.run(program),
            Err(err) => RunOutcome::Error(err.into()),
        }
    }

    pub fn run(&mut self, program: Arc<Program>) -> RunOutcome {
        self.run_until(program, || false)
    }

    /// Start a run that is interrupted if `cancelled` already reports true.
    ///
    /// A halt left over from an earlier run is cleared first, so a halt
    /// raised by another thread after `cancelled` flips is never lost.
    pub fn run_until(
        &mut self,
        program: Arc<Program>,
        cancelled: impl FnOnce() -> bool,
    ) -> RunOutcome {
        self.interp.control.clear_halt();
        if cancelled() {
            self.interp.control.halt();
        }
        executor::run_program(&mut self.interp, program)
    }

    pub fn resume(&mut self, handle: ChainHandle, completion: Completion) -> RunOutcome {
        executor::resume_program(&mut self.interp, handle, completion)
    }

    /// Clonable handle for pause / step / halt from another thread
    pub fn control(&self) -> EngineControl {
        self.interp.control.clone()
    }

    pub fn pause(&self) {
        self.interp.control.pause();
    }

    pub fn step(&self) {
        self.interp.control.step();
    }

    pub fn resume_paused(&self) {
        self.interp.control.resume_paused();
    }

    pub fn halt(&self) {
        self.interp.control.halt();
    }

    pub fn is_suspended(&self) -> bool {
        self.interp.is_suspended()
    }

    /// Text of the statement at the current position
    pub fn current_statement_text(&self) -> String {
        let live = &self.interp.live;
        live.program.statement_text(live.pc)
    }

    pub fn context_trace(&self) -> Vec<TraceLine> {
        executor::context_trace(&self.interp)
    }

    pub fn depth(&self) -> usize {
        self.interp.depth()
    }

    pub fn output(&self) -> &[String] {
        &self.interp.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.interp.output)
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.interp.history.iter().map(String::as_str)
    }

    pub fn global(&self, name: &str) -> Option<&Val> {
        self.interp.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Val) {
        self.interp.globals.insert(name.to_string(), value);
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }
}
