//! Expression trees carried inside statement tokens

use super::values::Val;
use serde::Serialize;

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum Expr {
    Lit {
        v: Val,
    },
    Ident {
        name: String,
    },
    List {
        items: Vec<Expr>,
    },
    Map {
        entries: Vec<(Expr, Expr)>,
    },
    Bits {
        bits: Vec<u32>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl Expr {
    pub fn lit(v: impl Into<Val>) -> Self {
        Expr::Lit { v: v.into() }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident { name: name.into() }
    }
}

/* ===================== Assignment targets ===================== */

/// `name`, `name[i]`, `name["k"][j]`, ...
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LValue {
    pub name: String,
    pub path: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub target: LValue,
    /// `var x = ...` declares in the innermost scope
    pub declare: bool,
    pub value: Expr,
}

/* ===================== Loop headers ===================== */

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum ForClause {
    /// `for (init; test; step)`
    Counted {
        init: Option<Assignment>,
        test: Option<Expr>,
        step: Option<Assignment>,
    },
    /// `for (x in collection)`
    Each {
        var: String,
        local: bool,
        source: Expr,
    },
    /// `for (i from [a, b])`, inclusive, counting down when b < a
    Range {
        var: String,
        local: bool,
        bounds: Expr,
    },
}
