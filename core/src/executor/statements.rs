//! Flow-control statements
//!
//! Each handler runs one flow statement and tells the dispatch loop where
//! to go next. Loops and try/catch push a context on first entry; the
//! matching `end` jumps back to the opener with `for_check` set so the
//! opener knows it is re-entering rather than starting.
//!
//! ## Clause chains
//! `if`/`elseif`/`else` and `case`/`default` are linked through the
//! branch table: each clause's edge points at the next clause (or `end`).
//! When a clause is taken, the next clause's edge is marked `Taken` so
//! the rest of the chain is skipped.

use super::expressions::{assign_lvalue, eval_condition, eval_expr};
use super::types::token::{self, Payload, Tok};
use super::types::{
    Assignment, BranchState, ContextReason, Expr, ForClause, FunctionDef, LoopCursor, LoopState,
    PopMode, Statement, StepResult, Val,
};
use super::vm::Interpreter;
use crate::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, trace};

/* ===================== Dispatch ===================== */

pub fn execute_flow(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    match st.tok() {
        token::IF | token::ELSEIF => execute_if(interp, st),
        token::ELSE => execute_else(interp),
        token::END => execute_end(interp, st),
        token::WHILE => execute_while(interp, st),
        token::FOR => execute_for(interp, st),
        token::SWITCH => execute_switch(interp, st),
        token::CASE => execute_case(interp, st),
        token::DEFAULT => execute_default(interp, st),
        token::BREAK => execute_break(interp, st),
        token::CONTINUE => execute_continue(interp, st),
        token::TRY => execute_try(interp, st),
        token::CATCH => execute_catch(interp, st),
        token::FUNCTION => execute_function_def(interp, st),
        token::RETURN => execute_return(interp, st),
        token::CALL => execute_call(interp, st),
        other => Err(interp.runtime_error(format!("unknown flow command {:#x}", other))),
    }
}

/* ===================== Helpers ===================== */

fn edge(interp: &Interpreter, pc: usize) -> Result<usize, EngineError> {
    interp
        .live
        .branches
        .target(pc)
        .ok_or_else(|| interp.runtime_error("flow statement has no matching end"))
}

fn expr_arg<'a>(interp: &Interpreter, st: &'a Statement) -> Result<&'a Expr, EngineError> {
    st.arg(0)
        .and_then(|t| t.as_expr())
        .ok_or_else(|| interp.runtime_error("missing expression"))
}

fn locals(st: &Statement) -> &[String] {
    st.head().map(|t| t.locals()).unwrap_or(&[])
}

fn head_int(st: &Statement) -> Option<usize> {
    st.head().and_then(|t| t.target())
}

/// Pop flow contexts of the current program whose opener lies in `lo..=hi`.
///
/// Never crosses a function or script frame.
fn unwind_flow(interp: &mut Interpreter, lo: usize, hi: usize) {
    while let Some(top) = interp.top() {
        let in_range = top.opener.map(|o| o >= lo && o <= hi).unwrap_or(false);
        if !top.reason.is_flow() || !in_range {
            break;
        }
        interp.pop_context(PopMode::Flow);
    }
}

/* ===================== If / Else ===================== */

fn execute_if(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let next = edge(interp, pc)?;
    let done = st.tok() == token::ELSEIF && interp.live.branches.state(pc) == BranchState::Taken;
    let condition = expr_arg(interp, st)?;
    let take = !done && eval_condition(interp, condition)?;

    let next_tok = interp
        .live
        .program
        .statement(next)
        .map(|s| s.tok())
        .unwrap_or(0);
    if next_tok == token::ELSEIF || next_tok == token::ELSE {
        let state = if done || take {
            BranchState::Taken
        } else {
            BranchState::Pending
        };
        interp.live.branches.set_state(next, state);
    }

    Ok(if take {
        StepResult::Continue
    } else {
        StepResult::Jump(next)
    })
}

fn execute_else(interp: &mut Interpreter) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    if interp.live.branches.state(pc) == BranchState::Taken {
        return Ok(StepResult::Jump(edge(interp, pc)?));
    }
    Ok(StepResult::Continue)
}

/* ===================== End ===================== */

fn execute_end(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let Some(head) = st.head() else {
        return Ok(StepResult::Continue);
    };
    let opener = head
        .target()
        .ok_or_else(|| interp.runtime_error("end without opener"))?;
    let closes: Tok = match head.payload {
        Payload::Closes(tok) => tok,
        _ => 0,
    };

    match closes {
        token::WHILE | token::FOR => {
            interp.live.for_check = true;
            Ok(StepResult::Jump(opener))
        }
        token::SWITCH => end_switch(interp, opener),
        token::TRY => {
            end_try(interp, opener);
            Ok(StepResult::Continue)
        }
        token::CATCH => {
            if interp.top().map(|c| c.reason) == Some(ContextReason::Catch) {
                interp.pop_context(PopMode::Flow);
            }
            Ok(StepResult::Continue)
        }
        _ => Ok(StepResult::Continue),
    }
}

/* ===================== While ===================== */

fn execute_while(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let end = edge(interp, pc)?;
    if !interp.live.for_check {
        interp.push_context(ContextReason::While, Some(pc), locals(st))?;
    }
    interp.live.for_check = false;

    let condition = expr_arg(interp, st)?;
    if !eval_condition(interp, condition)? {
        interp.pop_context(PopMode::Flow);
        return Ok(StepResult::Jump(end + 1));
    }
    Ok(StepResult::Continue)
}

/* ===================== For ===================== */

fn execute_for(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let end = edge(interp, pc)?;
    let clause = match st.arg(0).map(|t| &t.payload) {
        Some(Payload::For(clause)) => clause,
        _ => return Err(interp.runtime_error("malformed for statement")),
    };

    let re_entry = interp.live.for_check;
    interp.live.for_check = false;
    if !re_entry {
        interp.push_context(ContextReason::For, Some(pc), locals(st))?;
    }

    let ok = match clause {
        ForClause::Counted { init, test, step } => {
            let assignment = if re_entry { step } else { init };
            if let Some(a) = assignment {
                run_assignment(interp, a)?;
            }
            match test {
                Some(test) => eval_condition(interp, test)?,
                None => true,
            }
        }
        ForClause::Each { var, local, source } if !re_entry => {
            let items = match eval_expr(interp, source)? {
                Val::List(items) => items,
                Val::Map(map) => Val::sorted_keys(&map).into_iter().map(Val::Str).collect(),
                Val::Bits(bits) => bits.into_iter().map(|b| Val::Int(b as i64)).collect(),
                other => {
                    return Err(interp.runtime_error(format!(
                        "cannot iterate over {}",
                        other.type_name()
                    )))
                }
            };
            start_loop(interp, pc, var, *local, LoopCursor::Items { items, next: 0 })
        }
        ForClause::Range { var, local, bounds } if !re_entry => {
            let bounds = eval_expr(interp, bounds)?;
            let (start, stop) = match &bounds {
                Val::List(pair) if pair.len() == 2 => (pair[0].as_int(), pair[1].as_int()),
                _ => (None, None),
            };
            let (Some(start), Some(stop)) = (start, stop) else {
                return Err(interp.runtime_error("for ... from expects [start, end]"));
            };
            let step = if stop < start { -1 } else { 1 };
            let cursor = LoopCursor::Range {
                next: Some(start),
                end: stop,
                step,
            };
            start_loop(interp, pc, var, *local, cursor)
        }
        ForClause::Each { .. } | ForClause::Range { .. } => advance_loop(interp, pc)?,
    };

    if !ok {
        interp.pop_context(PopMode::Flow);
        return Ok(StepResult::Jump(end + 1));
    }
    Ok(StepResult::Continue)
}

fn run_assignment(interp: &mut Interpreter, a: &Assignment) -> Result<(), EngineError> {
    let value = eval_expr(interp, &a.value)?;
    assign_lvalue(interp, &a.target, value, a.declare)
}

fn start_loop(
    interp: &mut Interpreter,
    pc: usize,
    var: &str,
    local: bool,
    cursor: LoopCursor,
) -> bool {
    if local {
        interp.declare(var, Val::Null);
    }
    interp.live.loop_state = Some(LoopState {
        opener: pc,
        var: var.to_string(),
        cursor,
    });
    step_cursor(interp)
}

fn advance_loop(interp: &mut Interpreter, pc: usize) -> Result<bool, EngineError> {
    match &interp.live.loop_state {
        Some(state) if state.opener == pc => Ok(step_cursor(interp)),
        _ => Err(interp.runtime_error("loop state lost on re-entry")),
    }
}

/// Move the loop cursor forward and bind the loop variable
fn step_cursor(interp: &mut Interpreter) -> bool {
    let Some(state) = interp.live.loop_state.as_mut() else {
        return false;
    };
    let value = match &mut state.cursor {
        LoopCursor::Items { items, next } => {
            let value = items.get(*next).cloned();
            *next += 1;
            value
        }
        LoopCursor::Range { next, end, step } => {
            let current = next.take();
            if let Some(current) = current {
                if current != *end {
                    *next = current.checked_add(*step);
                }
            }
            current.map(Val::Int)
        }
    };
    let var = state.var.clone();
    match value {
        Some(v) => {
            interp.assign(&var, v);
            true
        }
        None => false,
    }
}

/* ===================== Switch ===================== */

fn execute_switch(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let subject = expr_arg(interp, st)?;
    let subject = eval_expr(interp, subject)?;
    interp.live.branches.switch_subjects.insert(pc, subject);
    Ok(StepResult::Continue)
}

fn owner(interp: &Interpreter, st: &Statement) -> Result<usize, EngineError> {
    match st.head().map(|t| &t.payload) {
        Some(Payload::Owner(pc)) => Ok(*pc),
        _ => Err(interp.runtime_error("case outside switch")),
    }
}

fn execute_case(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let switch_pc = owner(interp, st)?;
    let Some(subject) = interp.live.branches.switch_subjects.get(&switch_pc).cloned() else {
        // an earlier case matched: fall through
        return Ok(StepResult::Continue);
    };
    let value = expr_arg(interp, st)?;
    let value = eval_expr(interp, value)?;
    if subject.loose_eq(&value) {
        interp.live.branches.switch_subjects.remove(&switch_pc);
        return Ok(StepResult::Continue);
    }
    Ok(StepResult::Jump(edge(interp, pc)?))
}

fn execute_default(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let switch_pc = owner(interp, st)?;
    if interp.live.branches.switch_subjects.contains_key(&switch_pc) {
        // later cases get their chance first
        return Ok(StepResult::Jump(edge(interp, pc)?));
    }
    Ok(StepResult::Continue)
}

fn end_switch(interp: &mut Interpreter, switch_pc: usize) -> Result<StepResult, EngineError> {
    if interp
        .live
        .branches
        .switch_subjects
        .remove(&switch_pc)
        .is_none()
    {
        return Ok(StepResult::Continue);
    }
    let end = interp.live.pc;
    let default_pc = (switch_pc + 1..end).find(|&i| {
        interp.live.program.statement(i).map(|s| s.tok()) == Some(token::DEFAULT)
            && matches!(
                interp.live.program.statements[i].head().map(|t| &t.payload),
                Some(Payload::Owner(o)) if *o == switch_pc
            )
    });
    Ok(match default_pc {
        Some(d) => StepResult::Jump(d + 1),
        None => StepResult::Continue,
    })
}

/* ===================== Break / Continue ===================== */

fn execute_break(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let target = head_int(st).ok_or_else(|| interp.runtime_error("break outside loop"))?;
    let end = edge(interp, target)?;

    // Leave every flow context opened inside the target, then the target's own
    loop {
        let Some(top) = interp.top() else { break };
        let in_range = top.opener.map(|o| o >= target && o <= end).unwrap_or(false);
        if !top.reason.is_flow() || !in_range {
            break;
        }
        interp.pop_context(PopMode::StatementOnly);
        let reached = interp.live.pc == target;
        interp.pop_context(PopMode::Flow);
        if reached {
            break;
        }
    }

    interp.live.branches.switch_subjects.remove(&target);
    interp.live.for_check = false;
    trace!(target, end, "break");
    Ok(StepResult::Jump(end + 1))
}

fn execute_continue(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let target = head_int(st).ok_or_else(|| interp.runtime_error("continue outside loop"))?;
    let end = edge(interp, target)?;
    unwind_flow(interp, target + 1, end);
    interp.live.for_check = true;
    Ok(StepResult::Jump(target))
}

/* ===================== Try / Catch ===================== */

fn execute_try(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    interp.push_context(ContextReason::Try, Some(pc), locals(st))?;
    interp.declare("_breakval", Val::Null);
    interp.declare("_errorval", Val::Null);
    Ok(StepResult::Continue)
}

/// Normal completion of a try body: close it and skip the catch
fn end_try(interp: &mut Interpreter, try_pc: usize) {
    while let Some(top) = interp.top() {
        let is_target = top.flags.is_try_catch && top.opener == Some(try_pc);
        if !top.reason.is_flow() {
            break;
        }
        interp.pop_context(PopMode::Flow);
        if is_target {
            break;
        }
    }
    let catch_pc = interp.live.pc + 1;
    if interp.live.program.statement(catch_pc).map(|s| s.tok()) == Some(token::CATCH) {
        interp.live.branches.set_state(catch_pc, BranchState::Taken);
    }
}

fn execute_catch(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let pc = interp.live.pc;
    let end = edge(interp, pc)?;
    if interp.live.branches.state(pc) == BranchState::Taken {
        interp.live.branches.set_state(pc, BranchState::Pending);
        return Ok(StepResult::Jump(end + 1));
    }

    interp.push_context(ContextReason::Catch, Some(pc), locals(st))?;
    let message = interp.live.branches.caught.remove(&pc).unwrap_or_default();
    interp.declare("_errorval", Val::Str(message.clone()));
    if let Some(name) = st.arg(0).and_then(|t| t.as_name()) {
        interp.declare(name, Val::Str(message));
    }
    Ok(StepResult::Continue)
}

/* ===================== Functions ===================== */

fn execute_function_def(
    interp: &mut Interpreter,
    st: &Statement,
) -> Result<StepResult, EngineError> {
    let def = match st.head().map(|t| &t.payload) {
        Some(Payload::Function(def)) => def.clone(),
        _ => return Err(interp.runtime_error("malformed function definition")),
    };
    debug!(name = %def.name, "define function");
    interp.functions.insert(def.name.to_lowercase(), def);
    Ok(StepResult::Continue)
}

/// Push a function frame and switch the live state to its program
pub fn enter_function(
    interp: &mut Interpreter,
    def: &Arc<FunctionDef>,
    args: Vec<Val>,
) -> Result<(), EngineError> {
    interp.push_context(ContextReason::Function, None, &[])?;
    for (i, param) in def.params.iter().enumerate() {
        interp.declare(param, args.get(i).cloned().unwrap_or(Val::Null));
    }
    interp.declare("_arguments", Val::List(args));
    interp.declare("_retval", Val::Null);
    interp.live.enter_program(def.program.clone());
    interp.live.function_name = Some(def.name.clone());
    Ok(())
}

pub fn lookup_function(interp: &Interpreter, name: &str) -> Result<Arc<FunctionDef>, EngineError> {
    interp
        .functions
        .get(&name.to_lowercase())
        .cloned()
        .ok_or_else(|| interp.runtime_error(format!("unknown function '{}'", name)))
}

fn execute_call(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let name = st
        .head()
        .and_then(|t| t.as_name())
        .ok_or_else(|| interp.runtime_error("malformed call"))?
        .to_string();
    let def = lookup_function(interp, &name)?;
    let args = st
        .args()
        .iter()
        .filter_map(|t| t.as_expr())
        .map(|e| eval_expr(interp, e))
        .collect::<Result<Vec<_>, _>>()?;
    enter_function(interp, &def, args)?;
    Ok(StepResult::Jump(0))
}

fn execute_return(interp: &mut Interpreter, st: &Statement) -> Result<StepResult, EngineError> {
    let value = match st.arg(0).and_then(|t| t.as_expr()) {
        Some(expr) => eval_expr(interp, expr)?,
        None => Val::Null,
    };

    while let Some(top) = interp.top() {
        if !top.reason.is_flow() {
            break;
        }
        interp.pop_context(PopMode::Flow);
    }
    if let Some(frame) = interp.top().filter(|c| c.reason == ContextReason::Function) {
        let scope = frame.scope_len;
        if let Some(frame_scope) = interp.scopes.get_mut(scope) {
            frame_scope.vars.insert("_retval".to_string(), value);
        }
    }
    Ok(StepResult::Jump(interp.live.program.len()))
}
