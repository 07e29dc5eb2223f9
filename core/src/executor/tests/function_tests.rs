//! Tests for function definition, call and return

use super::super::*;
use super::helpers::{output, run_script, run_script_error};
use crate::config::EngineConfig;
use maplit::hashmap;

#[test]
fn test_statement_call_with_args() {
    let source = r#"
        function greet(name) {
            print "hi", name
        }
        greet("bob")
        print "back"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["hi bob", "back"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_return_value_in_expression() {
    let source = r#"
        function add(a, b) {
            return a + b
        }
        total = add(2, 3) * 2
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(engine.global("total"), Some(&Val::Int(10)));
}

#[test]
fn test_recursion() {
    let source = r#"
        function fact(n) {
            if (n <= 1) {
                return 1
            }
            return n * fact(n - 1)
        }
        print fact(5)
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["120"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_function_locals_do_not_leak() {
    let source = r#"
        x = 1
        function f() {
            var x = 2
            return x
        }
        print f(), x
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["2 1"]);
}

#[test]
fn test_caller_locals_are_not_visible() {
    let source = r#"
        function g() {
            return hidden
        }
        while (true) {
            var hidden = 1
            print g()
            break
        }
    "#;

    let (_, err) = run_script_error(source, EngineConfig::default());

    assert!(err.message.contains("undefined variable 'hidden'"));
}

#[test]
fn test_functions_see_globals() {
    let source = r#"
        function bump() {
            counter = counter + 1
        }
        bump()
        bump()
    "#;

    let engine = run_script(source, hashmap! { "counter".to_string() => Val::Int(0) });

    assert_eq!(engine.global("counter"), Some(&Val::Int(2)));
}

#[test]
fn test_return_from_inside_loop() {
    let source = r#"
        function first_big(items) {
            for x in items {
                if (x > 1) {
                    return x
                }
            }
            return null
        }
        print first_big([1, 5, 7])
        print first_big([0])
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["5", ""]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_return_from_inside_try() {
    let source = r#"
        function safe() {
            try {
                return "ok"
            } catch {
                return "bad"
            }
        }
        print safe()
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["ok"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_arguments_binding() {
    let source = r#"
        function count() {
            return len(_arguments)
        }
        print count(1, 2, 3)
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["3"]);
}

#[test]
fn test_missing_parameters_are_null() {
    let source = r#"
        function show(a, b) {
            print a, b == null
        }
        show(1)
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1 true"]);
}

#[test]
fn test_error_in_function_caught_by_caller() {
    let source = r#"
        function bad() {
            throw "inner"
        }
        try {
            bad()
            print "unreachable"
        } catch (e) {
            print "caught", e
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["caught inner"]);
    assert_eq!(engine.depth(), 0);
    assert_eq!(engine.interpreter().live.function_name, None);
}

#[test]
fn test_error_in_expression_call_caught_by_caller() {
    let source = r#"
        function bad() {
            return nope
        }
        try {
            x = bad()
        } catch (e) {
            print e
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["undefined variable 'nope'"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_unknown_function() {
    let (_, err) = run_script_error("nosuch(1)", EngineConfig::default());

    assert!(err.message.contains("unknown function 'nosuch'"));
}

#[test]
fn test_error_trace_names_function_and_caller() {
    let source = "function boom() {\n  throw 'bang'\n}\nboom()";

    let (_, err) = run_script_error(source, EngineConfig::default());

    assert_eq!(err.trace.len(), 2);
    assert_eq!(err.trace[0].function.as_deref(), Some("boom"));
    assert_eq!(err.trace[0].line, 2);
    assert_eq!(err.trace[0].statement, "throw 'bang'");
    assert_eq!(err.trace[1].function, None);
    assert_eq!(err.trace[1].line, 4);
    assert_eq!(err.trace[1].statement, "boom()");
}
