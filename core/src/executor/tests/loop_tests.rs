//! Tests for While and For loops

use super::super::*;
use super::helpers::{output, run_script, run_script_error};
use crate::config::EngineConfig;
use maplit::hashmap;

/* ===================== While ===================== */

#[test]
fn test_while_simple_loop() {
    // i = 0; while (i < 3) { i = i + 1 }
    let source = r#"
        i = 0
        while (i < 3) {
            i = i + 1
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(engine.global("i"), Some(&Val::Int(3)));
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_while_zero_iterations() {
    let source = r#"
        while (false) {
            print "never"
        }
        print "done"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["done"]);
}

#[test]
fn test_while_with_break() {
    let source = r#"
        i = 0
        while (true) {
            if (i >= 5) {
                break
            }
            i = i + 1
        }
        print i
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["5"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_while_with_continue() {
    let source = r#"
        i = 0
        while (i < 5) {
            i = i + 1
            if (i % 2 == 0) {
                continue
            }
            print i
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1", "3", "5"]);
}

#[test]
fn test_loop_locals_are_scoped() {
    let source = r#"
        while (true) {
            var inner = 1
            break
        }
        print inner
    "#;

    let (_, err) = run_script_error(source, EngineConfig::default());

    assert!(err.message.contains("undefined variable 'inner'"));
}

/* ===================== For ===================== */

#[test]
fn test_for_counted() {
    let source = r#"
        total = 0
        for (i = 0; i < 4; i = i + 1) {
            total = total + i
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(engine.global("total"), Some(&Val::Int(6)));
    assert_eq!(engine.global("i"), Some(&Val::Int(4)));
}

#[test]
fn test_for_counted_with_local() {
    let source = r#"
        for (var j = 0; j < 2; j = j + 1) {
            print j
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["0", "1"]);
    assert_eq!(engine.global("j"), None);
}

#[test]
fn test_for_each_list() {
    let source = r#"
        for x in ["a", 2, true] {
            print x
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["a", "2", "true"]);
}

#[test]
fn test_for_each_map_keys_sorted() {
    let source = r#"
        m = {b: 2, a: 1, c: 3}
        for (var k in m) {
            print k, m[k]
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["a 1", "b 2", "c 3"]);
}

#[test]
fn test_for_each_bitset() {
    let source = r#"
        for b in ({5 1 3}) {
            print b
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1", "3", "5"]);
}

#[test]
fn test_for_range_both_directions() {
    let source = r#"
        for var k from [3, 1] {
            print k
        }
        for var k from [1, 2] {
            print k
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["3", "2", "1", "1", "2"]);
}

#[test]
fn test_for_range_at_integer_limits() {
    let source = r#"
        for i from [lo, lo + 1] {
            print i
        }
        for i from [hi, hi - 1] {
            print i
        }
        for i from [lo, lo] {
            print i
        }
    "#;

    let engine = run_script(
        source,
        hashmap! {
            "lo".to_string() => Val::Int(i64::MIN),
            "hi".to_string() => Val::Int(i64::MAX),
        },
    );

    assert_eq!(
        output(&engine),
        vec![
            "-9223372036854775808",
            "-9223372036854775807",
            "9223372036854775807",
            "9223372036854775806",
            "-9223372036854775808",
        ]
    );
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_for_each_brace_list() {
    let source = r#"
        for x in {1, 2, 3} {
            print x
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1", "2", "3"]);
}

#[test]
fn test_for_each_empty_collection() {
    let source = r#"
        for x in {} {
            print "never"
        }
        for x in [] {
            print "never"
        }
        print "done"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["done"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_nested_for_each() {
    let source = r#"
        for x in [1, 2] {
            for y in ["a", "b"] {
                print x, y
            }
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1 a", "1 b", "2 a", "2 b"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_for_each_with_continue() {
    let source = r#"
        for x in [1, 2, 3, 4] {
            if (x == 2) {
                continue
            }
            print x
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1", "3", "4"]);
}

#[test]
fn test_for_each_over_number_fails() {
    let (_, err) = run_script_error("for x in 5 {\n}", EngineConfig::default());

    assert!(err.message.contains("cannot iterate"));
}
