//! Command routing
//!
//! Non-flow statements are either built-in commands, handled here, or
//! host-registered commands looked up in the `CommandRegistry`. Commands
//! registered as shapes share one entry point and are told which shape
//! they were invoked for.

use super::expressions::{assign_lvalue, eval_expr};
use super::types::token::{self, tok_attr, Payload, Tok, SHAPE_COMMAND};
use super::types::{
    ContextReason, Expr, PopMode, ResumptionKey, Statement, StepResult, SuspendRequest, Val,
};
use super::vm::Interpreter;
use crate::compiler::Vocabulary;
use crate::errors::EngineError;
use crate::host::Threading;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/* ===================== Handler traits ===================== */

/// A host command. Receives its arguments already evaluated.
pub trait CommandHandler: Send + Sync {
    fn execute(&self, args: &[Val], interp: &mut Interpreter) -> Result<StepResult, EngineError>;
}

/// A family of commands that share one implementation, told which member ran
pub trait ShapeHandler: Send + Sync {
    fn execute(
        &self,
        shape: &str,
        args: &[Val],
        interp: &mut Interpreter,
    ) -> Result<StepResult, EngineError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&[Val], &mut Interpreter) -> Result<StepResult, EngineError> + Send + Sync,
{
    fn execute(&self, args: &[Val], interp: &mut Interpreter) -> Result<StepResult, EngineError> {
        self(args, interp)
    }
}

/* ===================== Registry ===================== */

pub struct CommandRegistry {
    vocabulary: Vocabulary,
    handlers: HashMap<Tok, Arc<dyn CommandHandler>>,
    shapes: HashMap<Tok, (String, Arc<dyn ShapeHandler>)>,
    next_id: u32,
}

impl CommandRegistry {
    pub fn with_builtins() -> Self {
        CommandRegistry {
            vocabulary: Vocabulary::builtin(),
            handlers: HashMap::new(),
            shapes: HashMap::new(),
            next_id: token::FIRST_HOST_COMMAND,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Register a command word. Replaces an earlier host registration of the
    /// same name; built-in words cannot be replaced.
    pub fn register(
        &mut self,
        name: &str,
        handler: impl CommandHandler + 'static,
    ) -> Result<Tok, EngineError> {
        let tok = self.allocate(name, token::COMMAND)?;
        self.handlers.insert(tok, Arc::new(handler));
        Ok(tok)
    }

    pub fn register_shape(
        &mut self,
        name: &str,
        handler: Arc<dyn ShapeHandler>,
    ) -> Result<Tok, EngineError> {
        let tok = self.allocate(name, token::COMMAND | SHAPE_COMMAND)?;
        self.shapes.insert(tok, (name.to_lowercase(), handler));
        Ok(tok)
    }

    fn allocate(&mut self, name: &str, category: Tok) -> Result<Tok, EngineError> {
        if let Some(existing) = self.vocabulary.lookup(name) {
            if token::tok_id(existing) < token::FIRST_HOST_COMMAND {
                return Err(EngineError::Compile {
                    message: format!("'{}' is a built-in command", name),
                    line: 0,
                });
            }
            self.handlers.remove(&existing);
            self.shapes.remove(&existing);
        }
        let tok = category | self.next_id;
        self.next_id += 1;
        self.vocabulary.insert(name, tok);
        Ok(tok)
    }

    pub fn handler(&self, tok: Tok) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&tok).cloned()
    }

    pub fn shape(&self, tok: Tok) -> Option<(String, Arc<dyn ShapeHandler>)> {
        self.shapes.get(&tok).cloned()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/* ===================== Dispatch ===================== */

pub fn process_command(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let tok = st.tok();
    match tok {
        token::SET => cmd_set(interp, st, false),
        token::VAR => cmd_set(interp, st, true),
        token::PRINT => cmd_print(interp, st),
        token::DELAY => cmd_delay(interp, st),
        token::SCRIPT => cmd_script(interp, st),
        token::PAUSE => {
            interp.control.pause();
            Ok(StepResult::Continue)
        }
        token::RESUME => {
            interp.control.resume_paused();
            Ok(StepResult::Continue)
        }
        token::STEP => {
            interp.control.step();
            Ok(StepResult::Continue)
        }
        token::EXIT => {
            interp.exit_requested = true;
            Ok(StepResult::Stop)
        }
        token::THROW => cmd_throw(interp, st),
        token::PUSH => {
            let pc = interp.live.pc;
            interp.push_context(ContextReason::Push, Some(pc), &[])?;
            Ok(StepResult::Continue)
        }
        token::POP => {
            if interp.top().map(|c| c.reason) != Some(ContextReason::Push) {
                return Err(interp.runtime_error("pop without matching push"));
            }
            interp.pop_context(PopMode::Flow);
            Ok(StepResult::Continue)
        }
        token::QUIET => cmd_quiet(interp, st),
        _ if tok_attr(tok, SHAPE_COMMAND) => {
            let (shape, handler) = interp
                .commands
                .shape(tok)
                .ok_or_else(|| interp.runtime_error("unregistered shape command"))?;
            let args = eval_args(interp, st)?;
            handler.execute(&shape, &args, interp)
        }
        _ => {
            let handler = interp.commands.handler(tok).ok_or_else(|| {
                interp.runtime_error(format!("unrecognized command {:#x}", tok))
            })?;
            let args = eval_args(interp, st)?;
            handler.execute(&args, interp)
        }
    }
}

fn eval_args(interp: &mut Interpreter, st: &Statement) -> Result<Vec<Val>, EngineError> {
    st.args()
        .iter()
        .filter_map(|t| t.as_expr())
        .map(|e| eval_expr(interp, e))
        .collect()
}

fn first_arg(interp: &mut Interpreter, st: &Statement) -> Result<Option<Val>, EngineError> {
    match st.arg(0).and_then(|t| t.as_expr()) {
        Some(expr) => eval_expr(interp, expr).map(Some),
        None => Ok(None),
    }
}

/* ===================== Built-ins ===================== */

fn cmd_set(interp: &mut Interpreter, st: &Statement, declare: bool) -> Result<StepResult, EngineError> {
    let target = match st.arg(0).map(|t| &t.payload) {
        Some(Payload::Target(lv)) => lv,
        _ => return Err(interp.runtime_error("missing assignment target")),
    };
    let value = match st.arg(1).and_then(|t| t.as_expr()) {
        Some(expr) => eval_expr(interp, expr)?,
        None => Val::Null,
    };
    assign_lvalue(interp, target, value, declare)?;
    Ok(StepResult::Continue)
}

fn cmd_print(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let values = eval_args(interp, st)?;
    let line = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    interp.print(line);
    Ok(StepResult::Continue)
}

fn cmd_throw(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let message = first_arg(interp, st)?
        .map(|v| v.to_string())
        .unwrap_or_else(|| "error".to_string());
    Err(EngineError::Thrown {
        message,
        pc: interp.live.pc,
        line: interp.live.program.line(interp.live.pc),
    })
}

fn cmd_quiet(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let on = match st.arg(0).and_then(|t| t.as_expr()) {
        Some(Expr::Ident { name }) if name.eq_ignore_ascii_case("on") => true,
        Some(Expr::Ident { name }) if name.eq_ignore_ascii_case("off") => false,
        Some(expr) => eval_expr(interp, expr)?.is_truthy(),
        None => true,
    };
    interp.live.quiet = on;
    Ok(StepResult::Continue)
}

/// `delay seconds`: blocks on threaded hosts, suspends on cooperative ones.
///
/// Inside a nested run that cannot suspend, a cooperative delay is skipped.
fn cmd_delay(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let seconds = match first_arg(interp, st)? {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| interp.runtime_error("delay expects a number of seconds"))?,
        None => 0.001,
    };
    let duration = Duration::from_secs_f64(seconds.max(0.0));

    match interp.threading() {
        Threading::Threaded => {
            interp.host.sleep(duration);
            Ok(StepResult::Continue)
        }
        Threading::Cooperative if interp.suspend_allowed => {
            Ok(StepResult::Suspend(SuspendRequest::delay(duration)))
        }
        Threading::Cooperative => {
            debug!(?duration, "delay skipped in nested run");
            Ok(StepResult::Continue)
        }
    }
}

/// `script "path"`: run another file in the current scope.
///
/// A cooperative host suspends with the statement replayed; the completion
/// text delivered on resume is picked up here via the load cache.
fn cmd_script(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let path = match first_arg(interp, st)? {
        Some(Val::Str(path)) => path,
        Some(other) => other.to_string(),
        None => return Err(interp.runtime_error("script expects a file name")),
    };

    let source = if interp.threading() == Threading::Cooperative && interp.suspend_allowed {
        let key = ResumptionKey::new(&interp.live.program.name, interp.live.pc, "script");
        match interp.load_cache.remove(&key) {
            Some(Ok(text)) => text,
            Some(Err(message)) => {
                return Err(interp.runtime_error(format!("cannot load {}: {}", path, message)))
            }
            None => return Ok(StepResult::Suspend(SuspendRequest::load(path))),
        }
    } else {
        interp
            .host
            .read_file(&path)
            .map_err(|e| interp.runtime_error(format!("cannot load {}: {}", path, e)))?
    };

    let commands = interp.commands.clone();
    let program = interp
        .programs
        .get_or_compile(&path, &source, commands.vocabulary())?;
    info!(path = %path, statements = program.len(), "running nested script");
    interp.push_context(ContextReason::Script, None, &[])?;
    interp.live.enter_program(program);
    Ok(StepResult::Jump(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Beep;

    impl ShapeHandler for Beep {
        fn execute(
            &self,
            shape: &str,
            args: &[Val],
            interp: &mut Interpreter,
        ) -> Result<StepResult, EngineError> {
            interp.print(format!("{}:{}", shape, args.len()));
            Ok(StepResult::Continue)
        }
    }

    #[test]
    fn test_builtin_words_are_reserved() {
        let mut registry = CommandRegistry::with_builtins();
        let result = registry.register("print", |_: &[Val], _: &mut Interpreter| {
            Ok(StepResult::Continue)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_register_allocates_distinct_tokens() {
        let mut registry = CommandRegistry::with_builtins();
        let a = registry
            .register("alpha", |_: &[Val], _: &mut Interpreter| Ok(StepResult::Continue))
            .unwrap();
        let b = registry.register_shape("sphere", Arc::new(Beep)).unwrap();
        assert_ne!(a, b);
        assert!(tok_attr(b, SHAPE_COMMAND));
        assert!(!tok_attr(a, SHAPE_COMMAND));
        assert_eq!(registry.vocabulary().lookup("ALPHA"), Some(a));
        assert!(registry.shape(b).is_some());
    }
}
