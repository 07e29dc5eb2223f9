//! Reference compiler - PEST-based parser producing token programs
//!
//! Parses script text and flattens every block construct into a linear
//! statement list with jump targets patched in:
//! - `if`/`elseif`/`else`: each clause points at the next clause, the last at `end`
//! - loops, `switch`, `try`, `catch`: the opener points at its `end`, the `end` back at the opener
//! - `break n`/`continue n`: resolved at compile time to the opener they leave
//!
//! Function bodies compile to their own programs.

use pest::Parser;
use pest_derive::Parser;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::EngineError;
use crate::executor::types::token::{self, tok_attr, Payload, Tok, Token, LOOP};
use crate::executor::types::{
    Assignment, BinOp, Expr, ForClause, FunctionDef, LValue, Program, Statement, UnaryOp, Val,
};

mod cache;


pub use cache::ProgramCache;

/* ===================== Vocabulary ===================== */

/// Command words known to the compiler, case-insensitive
#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: HashMap<String, Tok>,
}

impl Vocabulary {
    pub fn builtin() -> Self {
        let words = [
            ("print", token::PRINT),
            ("echo", token::PRINT),
            ("delay", token::DELAY),
            ("script", token::SCRIPT),
            ("pause", token::PAUSE),
            ("resume", token::RESUME),
            ("step", token::STEP),
            ("exit", token::EXIT),
            ("quit", token::EXIT),
            ("halt", token::EXIT),
            ("throw", token::THROW),
            ("push", token::PUSH),
            ("pop", token::POP),
            ("quiet", token::QUIET),
        ]
        .into_iter()
        .map(|(word, tok)| (word.to_string(), tok))
        .collect();
        Vocabulary { words }
    }

    pub fn lookup(&self, word: &str) -> Option<Tok> {
        self.words.get(&word.to_lowercase()).copied()
    }

    pub fn insert(&mut self, word: &str, tok: Tok) {
        self.words.insert(word.to_lowercase(), tok);
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "compiler/script.pest"]
struct ScriptParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

fn compile_error(message: impl Into<String>, line: usize) -> EngineError {
    EngineError::Compile {
        message: message.into(),
        line,
    }
}

fn from_pest(err: pest::error::Error<Rule>) -> EngineError {
    let line = match err.line_col {
        pest::error::LineColLocation::Pos((line, _)) => line,
        pest::error::LineColLocation::Span((line, _), _) => line,
    };
    compile_error(err.variant.message().to_string(), line)
}

fn line_of(pair: &Pair) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_if
            | Rule::kw_elseif
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_in
            | Rule::kw_from
            | Rule::kw_switch
            | Rule::kw_case
            | Rule::kw_default
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_return
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_function
            | Rule::kw_var
            | Rule::kw_set
    )
}

/// Children of `pair` without keyword tokens
fn inner<'i>(pair: Pair<'i>) -> impl Iterator<Item = Pair<'i>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn next_pair<'i>(parts: &mut impl Iterator<Item = Pair<'i>>, line: usize) -> Result<Pair<'i>, EngineError> {
    parts
        .next()
        .ok_or_else(|| compile_error("incomplete statement", line))
}

/* ===================== Public API ===================== */

/// Compile script text into a program
pub fn compile(name: &str, source: &str, vocabulary: &Vocabulary) -> Result<Program, EngineError> {
    let source: Arc<str> = Arc::from(source);
    let mut pairs = ScriptParser::parse(Rule::program, &*source).map_err(from_pest)?;
    let program = pairs
        .next()
        .ok_or_else(|| compile_error("empty parse", 0))?;

    let mut builder = Builder::new(name, source.clone(), vocabulary);
    for pair in inner(program) {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        builder.statement(pair)?;
    }
    Ok(builder.finish())
}

/* ===================== Statement builder ===================== */

struct Builder<'v> {
    name: String,
    source: Arc<str>,
    vocabulary: &'v Vocabulary,
    statements: Vec<Statement>,
    line_numbers: Vec<usize>,
    line_ranges: Vec<(usize, usize)>,
    /// Enclosing breakable openers, innermost last
    breakables: Vec<(Tok, usize)>,
    /// `var` names collected for each enclosing scope opener
    locals: Vec<Vec<String>>,
}

impl<'v> Builder<'v> {
    fn new(name: &str, source: Arc<str>, vocabulary: &'v Vocabulary) -> Self {
        Builder {
            name: name.to_string(),
            source,
            vocabulary,
            statements: Vec::new(),
            line_numbers: Vec::new(),
            line_ranges: Vec::new(),
            breakables: Vec::new(),
            locals: Vec::new(),
        }
    }

    fn finish(self) -> Program {
        Program {
            name: self.name,
            source: self.source,
            statements: self.statements,
            line_numbers: self.line_numbers,
            line_ranges: self.line_ranges,
        }
    }

    fn line_at(&self, offset: usize) -> usize {
        self.source
            .get(..offset)
            .map(|s| s.matches('\n').count() + 1)
            .unwrap_or(1)
    }

    fn emit(&mut self, tokens: Vec<Token>, range: (usize, usize)) -> usize {
        let pc = self.statements.len();
        self.statements.push(Statement::new(tokens));
        self.line_numbers.push(self.line_at(range.0));
        self.line_ranges.push(range);
        pc
    }

    /// Emit the `end` closing the construct opened at `opener`; `close` is
    /// the offset just past its closing brace
    fn emit_end(&mut self, closes: Tok, opener: usize, close: usize) -> usize {
        let token = Token {
            tok: token::END,
            int_value: opener as i32,
            payload: Payload::Closes(closes),
        };
        self.emit(vec![token], (close.saturating_sub(1), close))
    }

    fn patch(&mut self, pc: usize, target: usize) {
        if let Some(head) = self.statements[pc].tokens.first_mut() {
            head.int_value = target as i32;
        }
    }

    fn set_locals(&mut self, pc: usize, names: Vec<String>) {
        if let Some(head) = self.statements[pc].tokens.first_mut() {
            head.payload = Payload::Locals(names);
        }
    }

    fn block(&mut self, pair: Pair) -> Result<(), EngineError> {
        for statement in inner(pair) {
            self.statement(statement)?;
        }
        Ok(())
    }

    /// Compile a block that opens a lexical scope; returns its `var` names
    fn scoped_block(&mut self, pair: Pair) -> Result<Vec<String>, EngineError> {
        self.locals.push(Vec::new());
        let result = self.block(pair);
        let names = self.locals.pop().unwrap_or_default();
        result.map(|_| names)
    }

    fn statement(&mut self, pair: Pair) -> Result<(), EngineError> {
        match pair.as_rule() {
            Rule::if_stmt => self.if_stmt(pair),
            Rule::while_stmt => self.while_stmt(pair),
            Rule::for_stmt => self.for_stmt(pair),
            Rule::switch_stmt => self.switch_stmt(pair),
            Rule::try_stmt => self.try_stmt(pair),
            Rule::function_def => self.function_def(pair),
            Rule::break_stmt | Rule::continue_stmt => self.break_stmt(pair),
            Rule::return_stmt => {
                let range = (pair.as_span().start(), pair.as_span().end());
                let mut tokens = vec![Token::new(token::RETURN)];
                if let Some(value) = inner(pair).next() {
                    tokens.push(Token::expr(build_expr(value)?));
                }
                self.emit(tokens, range);
                Ok(())
            }
            Rule::var_stmt => {
                let range = (pair.as_span().start(), pair.as_span().end());
                let assignment = build_var(pair)?;
                if let Some(scope) = self.locals.last_mut() {
                    scope.push(assignment.target.name.clone());
                }
                self.emit(assignment_tokens(token::VAR, assignment), range);
                Ok(())
            }
            Rule::set_stmt | Rule::assign_stmt => {
                let range = (pair.as_span().start(), pair.as_span().end());
                let assignment = build_assignment(pair)?;
                self.emit(assignment_tokens(token::SET, assignment), range);
                Ok(())
            }
            Rule::call_stmt | Rule::command_stmt => self.command(pair),
            other => Err(compile_error(
                format!("unexpected {:?}", other),
                line_of(&pair),
            )),
        }
    }

    /* ===================== Flow constructs ===================== */

    fn if_stmt(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let start = pair.as_span().start();
        let close = pair.as_span().end();
        let mut parts = inner(pair);

        let condition = next_pair(&mut parts, line)?;
        let block = next_pair(&mut parts, line)?;
        let opener = self.emit(
            vec![Token::new(token::IF), Token::expr(build_expr(condition)?)],
            (start, block.as_span().start()),
        );
        self.block(block)?;

        let mut prev = opener;
        for clause in parts {
            let clause_start = clause
                .clone()
                .into_inner()
                .next()
                .map(|p| p.as_span().start())
                .unwrap_or_else(|| clause.as_span().start());
            let is_else = clause.as_rule() == Rule::else_clause;
            let mut clause_parts = inner(clause);
            let mut tokens = vec![Token::new(if is_else { token::ELSE } else { token::ELSEIF })];
            if !is_else {
                tokens.push(Token::expr(build_expr(next_pair(&mut clause_parts, line)?)?));
            }
            let block = next_pair(&mut clause_parts, line)?;
            let pc = self.emit(tokens, (clause_start, block.as_span().start()));
            self.patch(prev, pc);
            prev = pc;
            self.block(block)?;
        }

        let end = self.emit_end(token::IF, opener, close);
        self.patch(prev, end);
        Ok(())
    }

    fn while_stmt(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let start = pair.as_span().start();
        let close = pair.as_span().end();
        let mut parts = inner(pair);

        let condition = next_pair(&mut parts, line)?;
        let block = next_pair(&mut parts, line)?;
        let opener = self.emit(
            vec![Token::new(token::WHILE), Token::expr(build_expr(condition)?)],
            (start, block.as_span().start()),
        );
        self.loop_body(token::WHILE, opener, block, close)
    }

    fn for_stmt(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let start = pair.as_span().start();
        let close = pair.as_span().end();
        let mut parts = inner(pair);

        let header = next_pair(&mut parts, line)?;
        let block = next_pair(&mut parts, line)?;
        let clause = build_for_clause(header)?;
        let opener = self.emit(
            vec![
                Token::new(token::FOR),
                Token::with_payload(token::CLAUSE, Payload::For(clause)),
            ],
            (start, block.as_span().start()),
        );
        self.loop_body(token::FOR, opener, block, close)
    }

    fn loop_body(&mut self, kind: Tok, opener: usize, block: Pair, close: usize) -> Result<(), EngineError> {
        self.breakables.push((kind, opener));
        let names = self.scoped_block(block);
        self.breakables.pop();
        self.set_locals(opener, names?);
        let end = self.emit_end(kind, opener, close);
        self.patch(opener, end);
        Ok(())
    }

    fn switch_stmt(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let start = pair.as_span().start();
        let close = pair.as_span().end();
        let mut parts = inner(pair);

        let subject = next_pair(&mut parts, line)?;
        let header_end = subject.as_span().end();
        let opener = self.emit(
            vec![Token::new(token::SWITCH), Token::expr(build_expr(subject)?)],
            (start, header_end),
        );

        self.breakables.push((token::SWITCH, opener));
        let last = self.switch_clauses(opener, parts, line);
        self.breakables.pop();
        let last = last?;

        let end = self.emit_end(token::SWITCH, opener, close);
        self.patch(opener, end);
        if let Some(pc) = last {
            self.patch(pc, end);
        }
        Ok(())
    }

    /// Emit `case`/`default` clauses, each linked to the next; returns the last
    fn switch_clauses<'i>(
        &mut self,
        opener: usize,
        clauses: impl Iterator<Item = Pair<'i>>,
        line: usize,
    ) -> Result<Option<usize>, EngineError> {
        let mut prev: Option<usize> = None;
        for clause in clauses {
            let clause_start = clause.as_span().start();
            let is_case = clause.as_rule() == Rule::case_clause;
            let mut clause_parts = inner(clause);
            let pc = if is_case {
                let value = next_pair(&mut clause_parts, line)?;
                let value_end = value.as_span().end();
                let tokens = vec![
                    Token::with_payload(token::CASE, Payload::Owner(opener)),
                    Token::expr(build_expr(value)?),
                ];
                self.emit(tokens, (clause_start, value_end))
            } else {
                self.emit(
                    vec![Token::with_payload(token::DEFAULT, Payload::Owner(opener))],
                    (clause_start, clause_start + "default".len()),
                )
            };
            if let Some(p) = prev {
                self.patch(p, pc);
            }
            prev = Some(pc);
            for statement in clause_parts {
                self.statement(statement)?;
            }
        }
        Ok(prev)
    }

    fn try_stmt(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let start = pair.as_span().start();
        let mut parts = inner(pair);

        let block = next_pair(&mut parts, line)?;
        let try_close = block.as_span().end();
        let opener = self.emit(vec![Token::new(token::TRY)], (start, block.as_span().start()));
        let names = self.scoped_block(block)?;
        self.set_locals(opener, names);
        let end = self.emit_end(token::TRY, opener, try_close);
        self.patch(opener, end);

        let Some(catch) = parts.next() else {
            return Ok(());
        };
        let catch_start = catch
            .clone()
            .into_inner()
            .next()
            .map(|p| p.as_span().start())
            .unwrap_or_else(|| catch.as_span().start());
        let catch_close = catch.as_span().end();
        let mut catch_parts = inner(catch);
        let first = next_pair(&mut catch_parts, line)?;
        let mut tokens = vec![Token::new(token::CATCH)];
        let block = if first.as_rule() == Rule::ident {
            tokens.push(Token::with_payload(
                token::IDENTIFIER,
                Payload::Name(first.as_str().to_string()),
            ));
            next_pair(&mut catch_parts, line)?
        } else {
            first
        };
        let catch_pc = self.emit(tokens, (catch_start, block.as_span().start()));
        let names = self.scoped_block(block)?;
        self.set_locals(catch_pc, names);
        let end = self.emit_end(token::CATCH, catch_pc, catch_close);
        self.patch(catch_pc, end);
        Ok(())
    }

    fn function_def(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let start = pair.as_span().start();
        let mut parts = inner(pair);

        let name = next_pair(&mut parts, line)?.as_str().to_string();
        let mut next = next_pair(&mut parts, line)?;
        let mut params = Vec::new();
        if next.as_rule() == Rule::params {
            params = next.into_inner().map(|p| p.as_str().to_string()).collect();
            next = next_pair(&mut parts, line)?;
        }
        let header_end = next.as_span().start();

        let mut body = Builder::new(&name, self.source.clone(), self.vocabulary);
        body.block(next)?;
        let def = FunctionDef {
            name,
            params,
            program: Arc::new(body.finish()),
        };
        self.emit(
            vec![Token::with_payload(
                token::FUNCTION,
                Payload::Function(Arc::new(def)),
            )],
            (start, header_end),
        );
        Ok(())
    }

    fn break_stmt(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let range = (pair.as_span().start(), pair.as_span().end());
        let is_break = pair.as_rule() == Rule::break_stmt;
        let word = if is_break { "break" } else { "continue" };
        let levels = match inner(pair).next() {
            Some(n) => n
                .as_str()
                .parse::<usize>()
                .map_err(|_| compile_error(format!("bad {} level", word), line))?,
            None => 1,
        };

        let target = self
            .breakables
            .iter()
            .rev()
            .filter(|(tok, _)| is_break || tok_attr(*tok, LOOP))
            .map(|(_, pc)| *pc)
            .nth(levels.saturating_sub(1))
            .filter(|_| levels > 0)
            .ok_or_else(|| {
                compile_error(format!("{} {} has no enclosing target", word, levels), line)
            })?;

        let tok = if is_break { token::BREAK } else { token::CONTINUE };
        let mut tokens = vec![Token::with_int(tok, target as i32)];
        tokens.push(Token::with_int(token::INTEGER, levels as i32));
        self.emit(tokens, range);
        Ok(())
    }

    /* ===================== Commands ===================== */

    fn command(&mut self, pair: Pair) -> Result<(), EngineError> {
        let line = line_of(&pair);
        let range = (pair.as_span().start(), pair.as_span().end());
        let is_call = pair.as_rule() == Rule::call_stmt;
        let mut parts = inner(pair);
        let name = next_pair(&mut parts, line)?.as_str().to_string();

        let mut args = Vec::new();
        for part in parts {
            match part.as_rule() {
                Rule::args => {
                    for arg in part.into_inner() {
                        args.push(Token::expr(build_expr(arg)?));
                    }
                }
                _ => args.push(Token::expr(build_expr(part)?)),
            }
        }

        let head = match self.vocabulary.lookup(&name) {
            Some(tok) => Token::with_payload(tok, Payload::Name(name)),
            None if is_call => Token::with_payload(token::CALL, Payload::Name(name)),
            None => {
                return Err(compile_error(
                    format!("unrecognized command '{}'", name),
                    line,
                ))
            }
        };
        let mut tokens = vec![head];
        tokens.extend(args);
        self.emit(tokens, range);
        Ok(())
    }
}

fn assignment_tokens(tok: Tok, assignment: Assignment) -> Vec<Token> {
    vec![
        Token::new(tok),
        Token::with_payload(token::TARGET, Payload::Target(assignment.target)),
        Token::expr(assignment.value),
    ]
}

/* ===================== Assignments ===================== */

fn build_var(pair: Pair) -> Result<Assignment, EngineError> {
    let line = line_of(&pair);
    let mut parts = inner(pair);
    let name = next_pair(&mut parts, line)?.as_str().to_string();
    let value = match parts.next() {
        Some(value) => build_expr(value)?,
        None => Expr::lit(Val::Null),
    };
    Ok(Assignment {
        target: LValue {
            name,
            path: Vec::new(),
        },
        declare: true,
        value,
    })
}

fn build_assignment(pair: Pair) -> Result<Assignment, EngineError> {
    let line = line_of(&pair);
    let mut parts = inner(pair);
    let target = build_lvalue(next_pair(&mut parts, line)?)?;
    let value = build_expr(next_pair(&mut parts, line)?)?;
    Ok(Assignment {
        target,
        declare: false,
        value,
    })
}

fn build_lvalue(pair: Pair) -> Result<LValue, EngineError> {
    let line = line_of(&pair);
    let mut parts = pair.into_inner();
    let name = next_pair(&mut parts, line)?.as_str().to_string();
    let path = parts
        .map(|index| build_index(index, line))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LValue { name, path })
}

fn build_index(pair: Pair, line: usize) -> Result<Expr, EngineError> {
    let expr = pair
        .into_inner()
        .next()
        .ok_or_else(|| compile_error("empty index", line))?;
    build_expr(expr)
}

fn build_for_clause(pair: Pair) -> Result<ForClause, EngineError> {
    let line = line_of(&pair);
    let rule = pair.as_rule();
    match rule {
        Rule::for_each | Rule::for_range => {
            let local = pair
                .clone()
                .into_inner()
                .any(|p| p.as_rule() == Rule::kw_var);
            let mut parts = inner(pair);
            let var = next_pair(&mut parts, line)?.as_str().to_string();
            let source = build_expr(next_pair(&mut parts, line)?)?;
            Ok(if rule == Rule::for_each {
                ForClause::Each { var, local, source }
            } else {
                ForClause::Range {
                    var,
                    local,
                    bounds: source,
                }
            })
        }
        Rule::for_counted => {
            let (mut init, mut test, mut step) = (None, None, None);
            for part in pair.into_inner() {
                let child = part
                    .clone()
                    .into_inner()
                    .next()
                    .ok_or_else(|| compile_error("empty for clause", line))?;
                match part.as_rule() {
                    Rule::for_init if child.as_rule() == Rule::var_stmt => {
                        init = Some(build_var(child)?)
                    }
                    Rule::for_init => init = Some(build_assignment(child)?),
                    Rule::for_test => test = Some(build_expr(child)?),
                    Rule::for_step => step = Some(build_assignment(child)?),
                    _ => {}
                }
            }
            Ok(ForClause::Counted { init, test, step })
        }
        other => Err(compile_error(format!("unexpected {:?} in for", other), line)),
    }
}

/* ===================== Expressions ===================== */

fn build_expr(pair: Pair) -> Result<Expr, EngineError> {
    let line = line_of(&pair);
    match pair.as_rule() {
        Rule::expression => build_expr(next_pair(&mut pair.into_inner(), line)?),

        Rule::or_expr | Rule::and_expr | Rule::cmp_expr | Rule::add_expr | Rule::mul_expr => {
            let mut parts = pair.into_inner();
            let mut left = build_expr(next_pair(&mut parts, line)?)?;
            while let Some(op) = parts.next() {
                let right = build_expr(next_pair(&mut parts, line)?)?;
                left = Expr::Binary {
                    op: binary_op(op.as_str()),
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
            Ok(left)
        }

        Rule::unary => {
            let mut parts: Vec<Pair> = pair.into_inner().collect();
            let operand = parts
                .pop()
                .ok_or_else(|| compile_error("missing operand", line))?;
            let mut expr = build_expr(operand)?;
            for op in parts.into_iter().rev() {
                let op = if op.as_str() == "!" {
                    UnaryOp::Not
                } else {
                    UnaryOp::Neg
                };
                expr = fold_unary(op, expr);
            }
            Ok(expr)
        }

        Rule::postfix => {
            let mut parts = pair.into_inner();
            let mut expr = build_expr(next_pair(&mut parts, line)?)?;
            for index in parts {
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(build_index(index, line)?),
                };
            }
            Ok(expr)
        }

        Rule::call => {
            let mut parts = pair.into_inner();
            let name = next_pair(&mut parts, line)?.as_str().to_string();
            let args = match parts.next() {
                Some(args) => args
                    .into_inner()
                    .map(build_expr)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Expr::Call { name, args })
        }

        Rule::array => Ok(Expr::List {
            items: pair
                .into_inner()
                .map(build_expr)
                .collect::<Result<Vec<_>, _>>()?,
        }),

        Rule::brace => {
            let parts: Vec<Pair> = pair.into_inner().collect();
            if parts.iter().all(|p| p.as_rule() == Rule::map_entry) {
                let entries = parts
                    .into_iter()
                    .map(|entry| build_map_entry(entry, line))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Expr::Map { entries });
            }
            Ok(Expr::List {
                items: parts
                    .into_iter()
                    .map(build_expr)
                    .collect::<Result<Vec<_>, _>>()?,
            })
        }

        Rule::bitset => {
            let bits = pair
                .into_inner()
                .map(|p| {
                    p.as_str()
                        .parse::<u32>()
                        .map_err(|_| compile_error("bad bitset index", line))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Bits { bits })
        }

        Rule::number => {
            let text = pair.as_str();
            if !text.contains(&['.', 'e', 'E'][..]) {
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(Expr::lit(i));
                }
            }
            text.parse::<f64>()
                .map(|n| Expr::lit(Val::Num(n)))
                .map_err(|_| compile_error(format!("bad number '{}'", text), line))
        }

        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::lit(unescape(raw)))
        }

        Rule::boolean => Ok(Expr::lit(pair.as_str() == "true")),
        Rule::null => Ok(Expr::lit(Val::Null)),
        Rule::ident => Ok(Expr::ident(pair.as_str())),

        other => Err(compile_error(format!("unexpected {:?}", other), line)),
    }
}

fn build_map_entry(pair: Pair, line: usize) -> Result<(Expr, Expr), EngineError> {
    let mut parts = pair.into_inner();
    let key = match build_expr(next_pair(&mut parts, line)?)? {
        // bare words are keys, not variable reads
        Expr::Ident { name } => Expr::lit(name),
        other => other,
    };
    let value = build_expr(next_pair(&mut parts, line)?)?;
    Ok((key, value))
}

/// Negative literals fold into the literal
fn fold_unary(op: UnaryOp, expr: Expr) -> Expr {
    match (op, expr) {
        (UnaryOp::Neg, Expr::Lit { v: Val::Int(i) }) => Expr::lit(-i),
        (UnaryOp::Neg, Expr::Lit { v: Val::Num(n) }) => Expr::lit(Val::Num(-n)),
        (op, expr) => Expr::Unary {
            op,
            operand: Box::new(expr),
        },
    }
}

fn binary_op(op: &str) -> BinOp {
    match op {
        "||" => BinOp::Or,
        "&&" => BinOp::And,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        _ => BinOp::Rem,
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
