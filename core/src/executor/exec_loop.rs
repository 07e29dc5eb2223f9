//! Core execution loop
//!
//! `command_loop` dispatches statements until the program ends, a command
//! stops or suspends the run, or an error escapes every try/catch.
//!
//! ## Function Organization
//! 1. run_program() / resume_program() - Top-level drivers
//! 2. command_loop() - Dispatch loop over the live program
//! 3. step() - Execute one statement
//! 4. call_function() - Nested, non-suspendable run for calls in expressions
//!
//! ## Nesting
//! Statement-level function calls and nested scripts do not recurse: they
//! push a context, swap in the callee's program and keep looping. When a
//! program runs off its end and the top context swapped programs, that
//! context is popped and the caller continues after the calling statement.
//! Each loop owns only the contexts above its `base`.

use super::commands::process_command;
use super::statements::{enter_function, execute_flow, lookup_function};
use super::types::token::{tok_attr, FLOW_COMMAND};
use super::types::{
    BranchState, ChainHandle, Completion, ContextReason, PopMode, Program, ResumePoint,
    ResumptionKey, RunOutcome, StepResult, SuspendRequest, Suspension, Val,
};
use super::vm::Interpreter;
use crate::errors::{EngineError, ScriptError, TraceLine};
use crate::host::Threading;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, trace, warn};

/* ===================== Public API ===================== */

/// Run a compiled program from its first statement.
///
/// Pause and step requests are cleared; a pending halt is kept and stops
/// the run before its first statement.
pub fn run_program(interp: &mut Interpreter, program: Arc<Program>) -> RunOutcome {
    if interp.is_suspended() {
        return RunOutcome::Error(EngineError::Busy.into());
    }
    let _span = info_span!("run", program = %program.name).entered();
    info!(statements = program.len(), "run started");
    interp.control.clear_pause();
    interp.load_program(program);
    drive(interp)
}

/// Continue a suspended run.
///
/// The handle must name the current head of the chain. On success the
/// suspension context is popped, the completion is made available to the
/// replayed statement, and execution continues.
pub fn resume_program(
    interp: &mut Interpreter,
    handle: ChainHandle,
    completion: Completion,
) -> RunOutcome {
    let valid = interp
        .top()
        .map(|top| top.flags.must_resume && top.id == handle.head && interp.epoch == handle.epoch)
        .unwrap_or(false);
    if !valid {
        warn!(?handle, "resume with stale or unknown handle");
        return RunOutcome::Error(
            EngineError::NotResumable("handle does not match the suspended chain".into()).into(),
        );
    }

    let Some((key, resume_at)) = interp.top().and_then(|c| c.resumption.clone()) else {
        return RunOutcome::Error(
            EngineError::NotResumable("context has no resumption point".into()).into(),
        );
    };

    if interp.control.is_halted() {
        interp.clear_contexts();
        return RunOutcome::Error(EngineError::Interrupted.into());
    }

    match completion {
        Completion::Elapsed => {}
        Completion::Loaded(text) => {
            interp.load_cache.insert(key.clone(), Ok(text));
        }
        Completion::Failed(message) => {
            interp.load_cache.insert(key.clone(), Err(message));
        }
    }

    let _span = info_span!("resume", %key).entered();
    info!(?resume_at, "resuming");
    interp.pop_context(PopMode::Full);
    if resume_at == ResumePoint::Advance && !interp.control.is_paused() {
        interp.live.pc += 1;
    }
    drive(interp)
}

/// Run the top-level loop and convert its exit into an outcome
fn drive(interp: &mut Interpreter) -> RunOutcome {
    match command_loop(interp, 0, true) {
        Ok(LoopExit::Done) => {
            if !interp.contexts.is_empty() {
                debug!(depth = interp.depth(), "contexts left open at end of run");
                interp.clear_contexts();
            }
            info!("run completed");
            RunOutcome::Completed
        }
        Ok(LoopExit::Stopped) => {
            interp.clear_contexts();
            if interp.control.is_halted() && !interp.exit_requested {
                info!("run halted");
                return RunOutcome::Error(EngineError::Interrupted.into());
            }
            info!("run exited");
            RunOutcome::Completed
        }
        Ok(LoopExit::Suspended(suspension)) => {
            info!(key = %suspension.key, reason = ?suspension.reason, "run suspended");
            RunOutcome::Pending(suspension)
        }
        Err(err) => {
            let error = report_error(interp, &err);
            error!(code = %error.code, message = %error.message, "run failed");
            RunOutcome::Error(error)
        }
    }
}

/* ===================== Dispatch loop ===================== */

pub(crate) enum LoopExit {
    Done,
    Stopped,
    Suspended(Suspension),
}

enum Gate {
    Proceed,
    Halt,
    Suspend(SuspendRequest),
}

pub(crate) fn command_loop(
    interp: &mut Interpreter,
    base: usize,
    allow_suspend: bool,
) -> Result<LoopExit, EngineError> {
    let mut first = true;
    interp.last_yield = Instant::now();

    loop {
        if interp.live.pc >= interp.live.program.len() {
            if !finish_program(interp, base) {
                return Ok(LoopExit::Done);
            }
            continue;
        }

        match check_continue(interp, first, allow_suspend) {
            Gate::Proceed => {}
            Gate::Halt => return Ok(LoopExit::Stopped),
            Gate::Suspend(request) => return Ok(LoopExit::Suspended(suspend(interp, request))),
        }

        if allow_suspend && !first && should_yield(interp) {
            return Ok(LoopExit::Suspended(suspend(interp, SuspendRequest::yield_now())));
        }
        first = false;

        match step(interp) {
            Ok(StepResult::Continue) => interp.live.pc += 1,
            Ok(StepResult::Jump(pc)) => interp.live.pc = pc,
            Ok(StepResult::Stop) => return Ok(LoopExit::Stopped),
            Ok(StepResult::Suspend(request)) => {
                if !allow_suspend {
                    return Err(interp.runtime_error("cannot suspend inside an expression"));
                }
                return Ok(LoopExit::Suspended(suspend(interp, request)));
            }
            Err(err) => {
                if !catch_error(interp, base, &err) {
                    return Err(err);
                }
            }
        }
    }
}

/// Pop contexts left by the finished program. Returns true when a calling
/// program was restored and execution should continue.
fn finish_program(interp: &mut Interpreter, base: usize) -> bool {
    while interp.depth() > base {
        let Some(reason) = interp.pop_context(PopMode::Full) else {
            break;
        };
        if reason.swaps_program() {
            interp.live.pc += 1;
            return true;
        }
    }
    false
}

/// Statement-boundary check for halt, pause and single-step
fn check_continue(interp: &mut Interpreter, first: bool, allow_suspend: bool) -> Gate {
    let control = interp.control.clone();
    if control.is_halted() || interp.exit_requested {
        return Gate::Halt;
    }
    if control.is_stepping() && !first {
        control.set_paused();
    }
    if !control.is_paused() {
        return Gate::Proceed;
    }

    if interp.threading() == Threading::Cooperative && allow_suspend {
        return Gate::Suspend(SuspendRequest::pause());
    }

    debug!(pc = interp.live.pc, "paused");
    let poll = interp.config.pause_poll();
    while control.is_paused() && !control.is_halted() {
        interp.host.sleep(poll);
        if interp.threading() == Threading::Cooperative {
            // nested run on a cooperative host: nothing can unpause us mid-statement
            break;
        }
    }
    if control.is_halted() {
        return Gate::Halt;
    }
    Gate::Proceed
}

fn should_yield(interp: &Interpreter) -> bool {
    interp.threading() == Threading::Cooperative
        && interp.last_yield.elapsed() >= interp.config.yield_interval()
}

/// Execute the statement at the live pc
pub fn step(interp: &mut Interpreter) -> Result<StepResult, EngineError> {
    let program = interp.live.program.clone();
    let pc = interp.live.pc;
    let Some(st) = program.statement(pc) else {
        return Ok(StepResult::Continue);
    };
    let tok = st.tok();
    trace!(pc, tok = format_args!("{:#x}", tok), "dispatch");

    if tok_attr(tok, FLOW_COMMAND) {
        return execute_flow(interp, st);
    }

    interp.record_history(program.statement_text(pc));
    let result = process_command(interp, st)?;
    Ok(result)
}

/* ===================== Suspension ===================== */

fn suspend(interp: &mut Interpreter, request: SuspendRequest) -> Suspension {
    let key = ResumptionKey::new(
        &interp.live.program.name,
        interp.live.pc,
        request.reason.op(),
    );
    let handle = interp.push_suspend(key.clone(), request.resume_at);
    Suspension {
        handle,
        key,
        reason: request.reason,
        delay: request.delay,
    }
}

/* ===================== Errors ===================== */

/// Route an error to the innermost try above `base`.
///
/// Contexts above the try are popped, the try itself is popped with full
/// restore, and execution continues at its `catch` (or after the try when
/// there is none).
fn catch_error(interp: &mut Interpreter, base: usize, err: &EngineError) -> bool {
    if !err.is_catchable() {
        return false;
    }
    let Some(index) = interp.find_context(base, |c| c.flags.is_try_catch) else {
        return false;
    };

    while interp.depth() > index + 1 {
        interp.pop_context(PopMode::Full);
    }
    let try_pc = interp.top().and_then(|c| c.opener);
    interp.pop_context(PopMode::Full);
    let Some(try_pc) = try_pc else {
        return false;
    };
    let Some(end_try) = interp.live.branches.target(try_pc) else {
        return false;
    };

    let message = err.catch_message();
    let line = err.line().unwrap_or(0);
    debug!(try_pc, message = %message, "error caught");

    let catch_pc = end_try + 1;
    if interp.live.program.statement(catch_pc).map(|s| s.tok())
        == Some(super::types::token::CATCH)
    {
        interp.live.branches.set_state(catch_pc, BranchState::Pending);
        interp.live.branches.caught.insert(catch_pc, message.clone());
    }
    interp.live.error = Some(super::types::ErrorState { message, line });
    interp.live.pc = catch_pc;
    interp.live.for_check = false;
    true
}

/// Build the embedder-facing error and clear the chain
fn report_error(interp: &mut Interpreter, err: &EngineError) -> ScriptError {
    let trace = context_trace(interp);
    interp.clear_contexts();
    ScriptError::from_engine(err, trace)
}

/// One line for the live position and one per saved context, innermost first
pub fn context_trace(interp: &Interpreter) -> Vec<TraceLine> {
    let live = &interp.live;
    let mut trace = vec![TraceLine {
        program: live.program.name.clone(),
        function: live.function_name.clone(),
        line: live.program.line(live.pc),
        statement: live.program.statement_text(live.pc),
    }];
    for ctx in interp.contexts.iter().rev() {
        if ctx.reason == ContextReason::Suspend {
            continue;
        }
        let saved = &ctx.saved;
        trace.push(TraceLine {
            program: saved.program.name.clone(),
            function: saved.function_name.clone(),
            line: saved.program.line(saved.pc),
            statement: saved.program.statement_text(saved.pc),
        });
    }
    trace
}

/* ===================== Nested runs ===================== */

/// Call a user function from inside an expression.
///
/// Runs a nested dispatch loop owning only the contexts it creates. The
/// nested run may not suspend: cooperative delays are skipped and file
/// loads are read synchronously.
pub fn call_function(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Val>,
) -> Result<Val, EngineError> {
    let def = lookup_function(interp, name)?;
    enter_function(interp, &def, args)?;
    let base = interp.depth();

    let saved_allow = interp.suspend_allowed;
    interp.suspend_allowed = false;
    let result = command_loop(interp, base, false);
    interp.suspend_allowed = saved_allow;

    // errors leave the chain for the outer loop to unwind
    let exit = result?;

    let frame_scope = interp.contexts.get(base - 1).map(|c| c.scope_len);
    let value = frame_scope
        .and_then(|i| interp.scopes.get(i))
        .and_then(|s| s.vars.get("_retval").cloned())
        .unwrap_or(Val::Null);
    while interp.depth() >= base {
        interp.pop_context(PopMode::Full);
    }

    match exit {
        LoopExit::Stopped if interp.control.is_halted() => Err(EngineError::Interrupted),
        _ => Ok(value),
    }
}
