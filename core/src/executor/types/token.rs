//! Statement tokens
//!
//! Every statement is a short token list. The first token names the
//! statement kind; its `tok` carries category bits so the dispatcher can
//! route without a lookup table.
//!
//! Openers (`if`, `elseif`, `else`, `while`, `for`, `switch`, `case`,
//! `default`, `try`, `catch`) store in `int_value` the index of the next
//! clause or of their matching `end`. An `end` stores the index of its
//! opener. `break` and `continue` store the index of the opener they leave.

use super::ast::{Assignment, Expr, ForClause, LValue};
use super::program::FunctionDef;
use serde::Serialize;
use std::sync::Arc;

pub type Tok = u32;

/// `int_value` when the token carries no integer
pub const NO_VALUE: i32 = i32::MAX;

/* ===================== Categories ===================== */

pub const FLOW_COMMAND: Tok = 1 << 12;
pub const OPENER: Tok = 1 << 13;
pub const BREAKABLE: Tok = 1 << 14;
pub const LOOP: Tok = 1 << 15;
/// Opens a lexical scope when entered
pub const SCOPE: Tok = 1 << 16;
pub const COMMAND: Tok = 1 << 17;
pub const SHAPE_COMMAND: Tok = 1 << 18;
pub const SETTABLE: Tok = 1 << 19;
pub const EXPRESSION: Tok = 1 << 20;

const ID_MASK: Tok = 0xFFF;

/// True when every bit of `attr` is set in `tok`
#[inline]
pub fn tok_attr(tok: Tok, attr: Tok) -> bool {
    tok & attr == attr
}

pub fn tok_id(tok: Tok) -> u32 {
    tok & ID_MASK
}

/* ===================== Flow commands ===================== */

pub const IF: Tok = FLOW_COMMAND | OPENER | 1;
pub const ELSEIF: Tok = FLOW_COMMAND | OPENER | 2;
pub const ELSE: Tok = FLOW_COMMAND | OPENER | 3;
pub const END: Tok = FLOW_COMMAND | 4;
pub const WHILE: Tok = FLOW_COMMAND | OPENER | BREAKABLE | LOOP | SCOPE | 5;
pub const FOR: Tok = FLOW_COMMAND | OPENER | BREAKABLE | LOOP | SCOPE | 6;
pub const SWITCH: Tok = FLOW_COMMAND | OPENER | BREAKABLE | 7;
pub const CASE: Tok = FLOW_COMMAND | OPENER | 8;
pub const DEFAULT: Tok = FLOW_COMMAND | OPENER | 9;
pub const BREAK: Tok = FLOW_COMMAND | 10;
pub const CONTINUE: Tok = FLOW_COMMAND | 11;
pub const TRY: Tok = FLOW_COMMAND | OPENER | SCOPE | 12;
pub const CATCH: Tok = FLOW_COMMAND | OPENER | SCOPE | 13;
pub const FUNCTION: Tok = FLOW_COMMAND | 14;
pub const RETURN: Tok = FLOW_COMMAND | 15;
/// Statement-level call of a user function
pub const CALL: Tok = FLOW_COMMAND | 16;

/* ===================== Built-in commands ===================== */

pub const SET: Tok = COMMAND | SETTABLE | 32;
pub const VAR: Tok = COMMAND | SETTABLE | 33;
pub const PRINT: Tok = COMMAND | 34;
pub const DELAY: Tok = COMMAND | 35;
pub const SCRIPT: Tok = COMMAND | 36;
pub const PAUSE: Tok = COMMAND | 37;
pub const RESUME: Tok = COMMAND | 38;
pub const STEP: Tok = COMMAND | 39;
pub const EXIT: Tok = COMMAND | 40;
pub const THROW: Tok = COMMAND | 41;
pub const PUSH: Tok = COMMAND | 42;
pub const POP: Tok = COMMAND | 43;
pub const QUIET: Tok = COMMAND | 44;

/// Ids at or above this are handed out to host-registered commands
pub const FIRST_HOST_COMMAND: u32 = 256;

/* ===================== Operands ===================== */

pub const EXPR: Tok = EXPRESSION | 1;
pub const CLAUSE: Tok = EXPRESSION | 2;
pub const IDENTIFIER: Tok = SETTABLE | 3;
pub const TARGET: Tok = SETTABLE | 4;
pub const INTEGER: Tok = 5;

/// Display name of a flow keyword, used for `end` text and traces
pub fn flow_name(tok: Tok) -> &'static str {
    match tok {
        IF | ELSEIF | ELSE => "if",
        WHILE => "while",
        FOR => "for",
        SWITCH | CASE | DEFAULT => "switch",
        TRY => "try",
        CATCH => "catch",
        FUNCTION => "function",
        _ => "",
    }
}

/* ===================== Tokens ===================== */

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum Payload {
    None,
    Expr(Expr),
    Name(String),
    /// Names declared with `var` directly inside a scope opener's body
    Locals(Vec<String>),
    Target(LValue),
    Assign(Assignment),
    For(ForClause),
    #[serde(serialize_with = "serialize_function")]
    Function(Arc<FunctionDef>),
    /// On `end`: the construct it closes
    Closes(Tok),
    /// On `case`/`default`: pc of the owning `switch`
    Owner(usize),
}

fn serialize_function<S: serde::Serializer>(
    def: &Arc<FunctionDef>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    def.as_ref().serialize(serializer)
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub tok: Tok,
    pub int_value: i32,
    #[serde(skip_serializing_if = "Payload::is_none")]
    pub payload: Payload,
}

impl Token {
    pub fn new(tok: Tok) -> Self {
        Token {
            tok,
            int_value: NO_VALUE,
            payload: Payload::None,
        }
    }

    pub fn with_payload(tok: Tok, payload: Payload) -> Self {
        Token {
            tok,
            int_value: NO_VALUE,
            payload,
        }
    }

    pub fn with_int(tok: Tok, int_value: i32) -> Self {
        Token {
            tok,
            int_value,
            payload: Payload::None,
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Token::with_payload(EXPR, Payload::Expr(expr))
    }

    /// Statement index stored in `int_value`, if any
    pub fn target(&self) -> Option<usize> {
        (self.int_value != NO_VALUE && self.int_value >= 0).then_some(self.int_value as usize)
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match &self.payload {
            Payload::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn locals(&self) -> &[String] {
        match &self.payload {
            Payload::Locals(names) => names,
            _ => &[],
        }
    }
}
