//! Tests for Break and Continue across nested constructs

use super::helpers::{output, run_script};
use maplit::hashmap;

#[test]
fn test_break_two_levels() {
    let source = r#"
        count = 0
        while (true) {
            for x in [1, 2, 3] {
                count = count + 1
                if (x == 2) {
                    break 2
                }
            }
        }
        print count
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["2"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_break_one_level_keeps_outer_loop() {
    let source = r#"
        for x in [1, 2] {
            for y in [1, 2, 3] {
                if (y == 2) {
                    break
                }
                print x, y
            }
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1 1", "2 1"]);
}

#[test]
fn test_continue_two_levels() {
    let source = r#"
        for x in [1, 2] {
            for y in [1, 2] {
                if (y == 2) {
                    continue 2
                }
                print x, y
            }
            print "unreachable"
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1 1", "2 1"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_break_out_of_try_skips_catch() {
    let source = r#"
        while (true) {
            try {
                break
            } catch {
                print "caught"
            }
        }
        print "done"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["done"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_continue_out_of_try() {
    let source = r#"
        i = 0
        while (i < 3) {
            i = i + 1
            try {
                if (i == 2) {
                    continue
                }
                print i
            } catch {
                print "caught"
            }
        }
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1", "3"]);
    assert_eq!(engine.depth(), 0);
}
