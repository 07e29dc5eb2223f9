//! Tests for Try/Catch and error propagation

use super::helpers::{output, run_script, run_script_error};
use crate::config::EngineConfig;
use maplit::hashmap;

#[test]
fn test_throw_is_caught_with_binding() {
    let source = r#"
        try {
            throw "boom"
            print "unreachable"
        } catch (e) {
            print "caught", e
        }
        print "after"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["caught boom", "after"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_runtime_error_is_caught() {
    let source = r#"
        try {
            x = missing + 1
        } catch (e) {
            print e
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["undefined variable 'missing'"]);
}

#[test]
fn test_no_error_skips_catch() {
    let source = r#"
        try {
            print "ok"
        } catch {
            print "bad"
        }
        print "after"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["ok", "after"]);
}

#[test]
fn test_errorval_is_bound_in_catch() {
    let source = r#"
        try {
            throw "x"
        } catch {
            print _errorval
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["x"]);
}

#[test]
fn test_try_without_catch_swallows_error() {
    let source = r#"
        try {
            throw "quiet"
        }
        print "after"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["after"]);
}

#[test]
fn test_rethrow_reaches_outer_try() {
    let source = r#"
        try {
            try {
                throw "a"
            } catch (e) {
                throw e + "b"
            }
        } catch (e) {
            print e
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["ab"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_error_inside_loop_unwinds_to_try() {
    let source = r#"
        try {
            for x in [1, 2, 3] {
                if (x == 2) {
                    throw "stop at " + str(x)
                }
                print x
            }
        } catch (e) {
            print e
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1", "stop at 2"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_uncaught_throw_reaches_embedder() {
    let (engine, err) = run_script_error("print 1\nthrow 'bad'", EngineConfig::default());

    assert_eq!(err.code, "THROWN");
    assert_eq!(err.message, "bad");
    assert_eq!(err.line, Some(2));
    assert_eq!(output(&engine), vec!["1"]);
}

#[test]
fn test_nesting_limit_is_not_catchable() {
    let source = r#"
        function r() {
            r()
        }
        try {
            r()
        } catch {
            print "caught"
        }
    "#;
    let config = EngineConfig {
        max_context_depth: 10,
        ..Default::default()
    };

    let (engine, err) = run_script_error(source, config);

    assert_eq!(err.code, "NESTING_LIMIT");
    assert!(output(&engine).is_empty());
    assert_eq!(engine.depth(), 0);
    assert!(!err.trace.is_empty());
}
