//! Compiled programs
//!
//! A program is immutable once compiled and is shared by `Arc` between the
//! live state, saved contexts and the program cache.

use super::token::{flow_name, Payload, Tok, Token, END};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub tokens: Vec<Token>,
}

impl Statement {
    pub fn new(tokens: Vec<Token>) -> Self {
        Statement { tokens }
    }

    pub fn head(&self) -> Option<&Token> {
        self.tokens.first()
    }

    /// Kind of the statement, 0 when empty
    pub fn tok(&self) -> Tok {
        self.head().map(|t| t.tok).unwrap_or(0)
    }

    pub fn arg(&self, i: usize) -> Option<&Token> {
        self.tokens.get(i + 1)
    }

    pub fn args(&self) -> &[Token] {
        self.tokens.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Program {
    pub name: String,
    #[serde(skip)]
    pub source: Arc<str>,
    pub statements: Vec<Statement>,
    /// Source line of each statement (1-based)
    pub line_numbers: Vec<usize>,
    /// Byte range of each statement's header text in `source`
    pub line_ranges: Vec<(usize, usize)>,
}

impl Program {
    pub fn empty(name: impl Into<String>) -> Self {
        Program {
            name: name.into(),
            source: Arc::from(""),
            statements: Vec::new(),
            line_numbers: Vec::new(),
            line_ranges: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statement(&self, pc: usize) -> Option<&Statement> {
        self.statements.get(pc)
    }

    pub fn line(&self, pc: usize) -> usize {
        self.line_numbers
            .get(pc)
            .or_else(|| self.line_numbers.last())
            .copied()
            .unwrap_or(0)
    }

    /// Source text of the statement at `pc`, for traces and history
    pub fn statement_text(&self, pc: usize) -> String {
        let Some(statement) = self.statements.get(pc) else {
            return String::new();
        };
        if let Some(Token {
            tok: END,
            payload: Payload::Closes(closes),
            ..
        }) = statement.head()
        {
            return format!("end {}", flow_name(*closes));
        }
        match self.line_ranges.get(pc) {
            Some(&(start, end)) => self
                .source
                .get(start..end)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// A user function: its own program plus parameter names
#[derive(Debug, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub program: Arc<Program>,
}
