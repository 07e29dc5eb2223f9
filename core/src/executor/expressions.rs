//! Expression evaluation
//!
//! Expressions are evaluated eagerly against the interpreter's visible
//! scopes. A call to a user function from inside an expression runs a
//! nested dispatch loop that may not suspend.

use super::exec_loop::call_function;
use super::types::{BinOp, Expr, LValue, UnaryOp, Val};
use super::vm::Interpreter;
use crate::errors::EngineError;
use std::collections::{BTreeSet, HashMap};

/* ===================== Evaluation ===================== */

pub fn eval_expr(interp: &mut Interpreter, expr: &Expr) -> Result<Val, EngineError> {
    match expr {
        Expr::Lit { v } => Ok(v.clone()),

        Expr::Ident { name } => interp
            .lookup(name)
            .cloned()
            .ok_or_else(|| interp.runtime_error(format!("undefined variable '{}'", name))),

        Expr::List { items } => {
            let values = items
                .iter()
                .map(|item| eval_expr(interp, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Val::List(values))
        }

        Expr::Map { entries } => {
            let mut map = HashMap::new();
            for (key, value) in entries {
                let key = match eval_expr(interp, key)? {
                    Val::Str(s) => s,
                    other => other.to_string(),
                };
                let value = eval_expr(interp, value)?;
                map.insert(key, value);
            }
            Ok(Val::Map(map))
        }

        Expr::Bits { bits } => Ok(Val::Bits(bits.iter().copied().collect())),

        Expr::Index { object, index } => {
            let object = eval_expr(interp, object)?;
            let index = eval_expr(interp, index)?;
            index_value(interp, &object, &index)
        }

        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|arg| eval_expr(interp, arg))
                .collect::<Result<Vec<_>, _>>()?;
            if interp.functions.contains_key(&name.to_lowercase()) {
                return call_function(interp, name, args);
            }
            call_builtin(interp, name, args)
        }

        Expr::Unary { op, operand } => {
            let v = eval_expr(interp, operand)?;
            match op {
                UnaryOp::Not => Ok(Val::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Val::Int(i) => i
                        .checked_neg()
                        .map(Val::Int)
                        .ok_or_else(|| interp.runtime_error("integer overflow")),
                    Val::Num(n) => Ok(Val::Num(-n)),
                    other => Err(interp.runtime_error(format!(
                        "cannot negate {}",
                        other.type_name()
                    ))),
                },
            }
        }

        Expr::Binary { op, left, right } => match op {
            BinOp::And => {
                let l = eval_expr(interp, left)?;
                if !l.is_truthy() {
                    return Ok(Val::Bool(false));
                }
                Ok(Val::Bool(eval_expr(interp, right)?.is_truthy()))
            }
            BinOp::Or => {
                let l = eval_expr(interp, left)?;
                if l.is_truthy() {
                    return Ok(Val::Bool(true));
                }
                Ok(Val::Bool(eval_expr(interp, right)?.is_truthy()))
            }
            _ => {
                let l = eval_expr(interp, left)?;
                let r = eval_expr(interp, right)?;
                binary(interp, *op, l, r)
            }
        },
    }
}

pub fn eval_condition(interp: &mut Interpreter, expr: &Expr) -> Result<bool, EngineError> {
    Ok(eval_expr(interp, expr)?.is_truthy())
}

/* ===================== Operators ===================== */

fn binary(interp: &Interpreter, op: BinOp, l: Val, r: Val) -> Result<Val, EngineError> {
    use std::cmp::Ordering;

    let compare = |l: &Val, r: &Val| {
        l.compare(r).ok_or_else(|| {
            interp.runtime_error(format!(
                "cannot compare {} with {}",
                l.type_name(),
                r.type_name()
            ))
        })
    };

    match op {
        BinOp::Eq => Ok(Val::Bool(l.loose_eq(&r))),
        BinOp::Ne => Ok(Val::Bool(!l.loose_eq(&r))),
        BinOp::Lt => Ok(Val::Bool(compare(&l, &r)? == Ordering::Less)),
        BinOp::Le => Ok(Val::Bool(compare(&l, &r)? != Ordering::Greater)),
        BinOp::Gt => Ok(Val::Bool(compare(&l, &r)? == Ordering::Greater)),
        BinOp::Ge => Ok(Val::Bool(compare(&l, &r)? != Ordering::Less)),
        BinOp::Add => match (l, r) {
            (Val::Str(a), b) => Ok(Val::Str(format!("{}{}", a, b))),
            (a, Val::Str(b)) => Ok(Val::Str(format!("{}{}", a, b))),
            (Val::List(mut a), Val::List(b)) => {
                a.extend(b);
                Ok(Val::List(a))
            }
            (Val::List(mut a), b) => {
                a.push(b);
                Ok(Val::List(a))
            }
            (Val::Bits(a), Val::Bits(b)) => Ok(Val::Bits(a.union(&b).copied().collect())),
            (a, b) => arithmetic(interp, op, a, b),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arithmetic(interp, op, l, r),
        BinOp::And | BinOp::Or => Ok(Val::Bool(if op == BinOp::And {
            l.is_truthy() && r.is_truthy()
        } else {
            l.is_truthy() || r.is_truthy()
        })),
    }
}

fn arithmetic(interp: &Interpreter, op: BinOp, l: Val, r: Val) -> Result<Val, EngineError> {
    if let (Val::Int(a), Val::Int(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div if b == 0 => return Err(interp.runtime_error("division by zero")),
            BinOp::Div => match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                Some(_) => return Ok(Val::Num(a as f64 / b as f64)),
                None => None,
            },
            BinOp::Rem if b == 0 => return Err(interp.runtime_error("division by zero")),
            BinOp::Rem => a.checked_rem(b),
            _ => None,
        };
        return result
            .map(Val::Int)
            .ok_or_else(|| interp.runtime_error("integer overflow"));
    }

    let (Some(a), Some(b)) = (number(&l), number(&r)) else {
        return Err(interp.runtime_error(format!(
            "unsupported operand types: {} and {}",
            l.type_name(),
            r.type_name()
        )));
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b == 0.0 => return Err(interp.runtime_error("division by zero")),
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => unreachable!("non-arithmetic operator"),
    };
    Ok(Val::Num(result))
}

fn number(v: &Val) -> Option<f64> {
    match v {
        Val::Int(_) | Val::Num(_) | Val::Bool(_) => v.as_f64(),
        _ => None,
    }
}

/* ===================== Indexing ===================== */

fn list_index(len: usize, index: i64) -> Option<usize> {
    let i = if index < 0 { len as i64 + index } else { index };
    (i >= 0 && (i as usize) < len).then_some(i as usize)
}

fn index_value(interp: &Interpreter, object: &Val, index: &Val) -> Result<Val, EngineError> {
    match (object, index) {
        (Val::List(items), idx) => {
            let i = idx
                .as_int()
                .ok_or_else(|| interp.runtime_error("array index must be an integer"))?;
            list_index(items.len(), i)
                .map(|i| items[i].clone())
                .ok_or_else(|| interp.runtime_error(format!("index {} out of range", i)))
        }
        (Val::Map(map), key) => {
            let key = match key {
                Val::Str(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(map.get(&key).cloned().unwrap_or(Val::Null))
        }
        (Val::Str(s), idx) => {
            let i = idx
                .as_int()
                .ok_or_else(|| interp.runtime_error("string index must be an integer"))?;
            let chars: Vec<char> = s.chars().collect();
            list_index(chars.len(), i)
                .map(|i| Val::Str(chars[i].to_string()))
                .ok_or_else(|| interp.runtime_error(format!("index {} out of range", i)))
        }
        (Val::Bits(bits), idx) => {
            let i = idx
                .as_int()
                .ok_or_else(|| interp.runtime_error("bitset index must be an integer"))?;
            Ok(Val::Bool(i >= 0 && bits.contains(&(i as u32))))
        }
        (other, _) => Err(interp.runtime_error(format!("cannot index {}", other.type_name()))),
    }
}

/// Assign through an lvalue path such as `a[1]["k"] = v`
pub fn assign_lvalue(
    interp: &mut Interpreter,
    target: &LValue,
    value: Val,
    declare: bool,
) -> Result<(), EngineError> {
    if target.path.is_empty() {
        if declare {
            interp.declare(&target.name, value);
        } else {
            interp.assign(&target.name, value);
        }
        return Ok(());
    }

    let path = target
        .path
        .iter()
        .map(|p| eval_expr(interp, p))
        .collect::<Result<Vec<_>, _>>()?;
    let mut root = interp
        .lookup(&target.name)
        .cloned()
        .ok_or_else(|| interp.runtime_error(format!("undefined variable '{}'", target.name)))?;
    set_path(interp, &mut root, &path, value)?;
    interp.assign(&target.name, root);
    Ok(())
}

fn set_path(
    interp: &Interpreter,
    slot: &mut Val,
    path: &[Val],
    value: Val,
) -> Result<(), EngineError> {
    let Some((first, rest)) = path.split_first() else {
        *slot = value;
        return Ok(());
    };
    match slot {
        Val::List(items) => {
            let i = first
                .as_int()
                .and_then(|i| list_index(items.len(), i))
                .ok_or_else(|| interp.runtime_error(format!("index {} out of range", first)))?;
            set_path(interp, &mut items[i], rest, value)
        }
        Val::Map(map) => {
            let key = match first {
                Val::Str(s) => s.clone(),
                other => other.to_string(),
            };
            let entry = map.entry(key).or_insert(Val::Null);
            set_path(interp, entry, rest, value)
        }
        Val::Bits(bits) if rest.is_empty() => {
            let i = first
                .as_int()
                .filter(|i| *i >= 0)
                .ok_or_else(|| interp.runtime_error("bitset index must be a non-negative integer"))?;
            if value.is_truthy() {
                bits.insert(i as u32);
            } else {
                bits.remove(&(i as u32));
            }
            Ok(())
        }
        Val::Null => {
            *slot = Val::Map(HashMap::new());
            set_path(interp, slot, path, value)
        }
        other => Err(interp.runtime_error(format!(
            "cannot assign into {}",
            other.type_name()
        ))),
    }
}

/* ===================== Built-in functions ===================== */

fn call_builtin(interp: &Interpreter, name: &str, args: Vec<Val>) -> Result<Val, EngineError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(interp.runtime_error(format!(
                "{}() takes {} argument(s), got {}",
                name,
                n,
                args.len()
            )))
        }
    };
    let int_arg = |v: &Val| {
        v.as_int()
            .ok_or_else(|| interp.runtime_error(format!("{}() expects an integer", name)))
    };

    match name.to_lowercase().as_str() {
        "len" => {
            arity(1)?;
            let n = match &args[0] {
                Val::Str(s) => s.chars().count(),
                Val::List(items) => items.len(),
                Val::Map(map) => map.len(),
                Val::Bits(bits) => bits.len(),
                Val::Null => 0,
                other => {
                    return Err(interp.runtime_error(format!(
                        "len() not supported for {}",
                        other.type_name()
                    )))
                }
            };
            Ok(Val::Int(n as i64))
        }
        "keys" => {
            arity(1)?;
            match &args[0] {
                Val::Map(map) => Ok(Val::List(
                    Val::sorted_keys(map).into_iter().map(Val::Str).collect(),
                )),
                other => Err(interp.runtime_error(format!(
                    "keys() expects a map, got {}",
                    other.type_name()
                ))),
            }
        }
        "str" => {
            arity(1)?;
            Ok(Val::Str(args[0].to_string()))
        }
        "int" => {
            arity(1)?;
            Ok(Val::Int(int_arg(&args[0])?))
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Val::Int(i) => i
                    .checked_abs()
                    .map(Val::Int)
                    .ok_or_else(|| interp.runtime_error("integer overflow")),
                Val::Num(n) => Ok(Val::Num(n.abs())),
                other => Err(interp.runtime_error(format!(
                    "abs() expects a number, got {}",
                    other.type_name()
                ))),
            }
        }
        "min" | "max" => {
            let values = match args.as_slice() {
                [Val::List(items)] => items.clone(),
                _ => args.clone(),
            };
            let want_max = name.eq_ignore_ascii_case("max");
            let mut best: Option<Val> = None;
            for v in values {
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let ord = v.compare(&b).ok_or_else(|| {
                            interp.runtime_error(format!("{}() arguments must be comparable", name))
                        })?;
                        let better = if want_max {
                            ord == std::cmp::Ordering::Greater
                        } else {
                            ord == std::cmp::Ordering::Less
                        };
                        if better {
                            v
                        } else {
                            b
                        }
                    }
                });
            }
            best.ok_or_else(|| interp.runtime_error(format!("{}() of nothing", name)))
        }
        "range" => {
            let (start, end) = match args.as_slice() {
                [n] => (0, int_arg(n)?),
                [a, b] => (int_arg(a)?, int_arg(b)?),
                _ => return Err(interp.runtime_error("range() takes 1 or 2 arguments")),
            };
            Ok(Val::List((start..end).map(Val::Int).collect()))
        }
        "bits" => Ok(Val::Bits(
            args.iter()
                .map(|v| int_arg(v).map(|i| i.max(0) as u32))
                .collect::<Result<BTreeSet<_>, _>>()?,
        )),
        _ => Err(interp.runtime_error(format!("unknown function '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::commands::CommandRegistry;
    use crate::host::MemoryHost;
    use std::sync::Arc;

    fn interp() -> Interpreter {
        Interpreter::new(
            Default::default(),
            Arc::new(MemoryHost::default()),
            Arc::new(CommandRegistry::with_builtins()),
        )
    }

    fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        let mut interp = interp();
        let e = bin(BinOp::Div, Expr::lit(6i64), Expr::lit(3i64));
        assert_eq!(eval_expr(&mut interp, &e).unwrap(), Val::Int(2));
        let e = bin(BinOp::Div, Expr::lit(7i64), Expr::lit(2i64));
        assert_eq!(eval_expr(&mut interp, &e).unwrap(), Val::Num(3.5));
    }

    #[test]
    fn test_integer_overflow_is_runtime_error() {
        let mut interp = interp();
        let e = bin(BinOp::Div, Expr::lit(i64::MIN), Expr::lit(-1i64));
        let err = eval_expr(&mut interp, &e).unwrap_err();
        assert_eq!(err.code(), "RUNTIME_ERROR");
        assert!(err.to_string().contains("integer overflow"));

        let e = bin(BinOp::Rem, Expr::lit(i64::MIN), Expr::lit(-1i64));
        assert!(eval_expr(&mut interp, &e).is_err());

        let err = call_builtin(&interp, "abs", vec![Val::Int(i64::MIN)]).unwrap_err();
        assert!(err.to_string().contains("integer overflow"));
        assert_eq!(
            call_builtin(&interp, "abs", vec![Val::Int(-5)]).unwrap(),
            Val::Int(5)
        );
    }

    #[test]
    fn test_undefined_variable_is_runtime_error() {
        let mut interp = interp();
        let err = eval_expr(&mut interp, &Expr::ident("nope")).unwrap_err();
        assert_eq!(err.code(), "RUNTIME_ERROR");
    }

    #[test]
    fn test_nested_lvalue_assignment() {
        let mut interp = interp();
        interp.globals.insert(
            "a".into(),
            Val::List(vec![Val::Map(HashMap::new()), Val::Int(1)]),
        );
        let target = LValue {
            name: "a".into(),
            path: vec![Expr::lit(0i64), Expr::lit("k")],
        };
        assign_lvalue(&mut interp, &target, Val::Int(9), false).unwrap();
        let e = Expr::Index {
            object: Box::new(Expr::Index {
                object: Box::new(Expr::ident("a")),
                index: Box::new(Expr::lit(0i64)),
            }),
            index: Box::new(Expr::lit("k")),
        };
        assert_eq!(eval_expr(&mut interp, &e).unwrap(), Val::Int(9));
    }

    #[test]
    fn test_builtins() {
        let interp = interp();
        assert_eq!(
            call_builtin(&interp, "max", vec![Val::Int(3), Val::Num(4.5), Val::Int(1)]).unwrap(),
            Val::Num(4.5)
        );
        assert_eq!(
            call_builtin(&interp, "range", vec![Val::Int(3)]).unwrap(),
            Val::List(vec![Val::Int(0), Val::Int(1), Val::Int(2)])
        );
        assert!(call_builtin(&interp, "len", vec![]).is_err());
    }
}
