//! Tests for assignments, output and built-in commands

use super::super::*;
use super::helpers::{build_engine, output, run_script, run_script_error, start};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::errors::EngineError;
use crate::host::{MemoryHost, Threading};
use maplit::hashmap;
use std::sync::Arc;

#[test]
fn test_assignment_and_print() {
    let source = r#"
        x = 1
        y = x + 2
        print "y is", y
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["y is 3"]);
    assert_eq!(engine.global("y"), Some(&Val::Int(3)));
}

#[test]
fn test_seeded_globals_are_visible() {
    let engine = run_script("print n * 2", hashmap! { "n".to_string() => Val::Int(4) });

    assert_eq!(output(&engine), vec!["8"]);
}

#[test]
fn test_indexed_assignment() {
    let source = r#"
        m = {a: 1}
        m["b"] = [1, 2]
        m["b"][0] = 9
        print m
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec![r#"{"a": 1, "b": [9, 2]}"#]);
}

#[test]
fn test_history_records_commands_only() {
    let source = "x = 1\nif (x) {\n  print x\n}";

    let engine = run_script(source, hashmap! {});

    let history: Vec<&str> = engine.history().collect();
    assert_eq!(history, vec!["x = 1", "print x"]);
}

#[test]
fn test_history_is_bounded() {
    let config = EngineConfig {
        history_size: 2,
        ..Default::default()
    };
    let (mut engine, _) = build_engine(config, MemoryHost::new(Threading::Threaded), hashmap! {});

    let outcome = start(&mut engine, "a = 1\nb = 2\nc = 3");

    assert!(outcome.is_completed());
    let history: Vec<&str> = engine.history().collect();
    assert_eq!(history, vec!["b = 2", "c = 3"]);
}

#[test]
fn test_quiet_suppresses_output() {
    let source = r#"
        quiet on
        print 1
        quiet off
        print 2
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["2"]);
}

#[test]
fn test_quiet_outlives_the_block_that_set_it() {
    let source = r#"
        while (true) {
            quiet on
            break
        }
        print "hidden"
        try {
            quiet off
        } catch (e) {
        }
        print "shown"
    "#;

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["shown"]);
}

#[test]
fn test_echo_reaches_host() {
    let (mut engine, host) = build_engine(
        EngineConfig::default(),
        MemoryHost::new(Threading::Threaded),
        hashmap! {},
    );

    start(&mut engine, "echo 'hello'");

    assert_eq!(host.echoed(), vec!["hello".to_string()]);
}

#[test]
fn test_exit_completes_cleanly() {
    let source = "print 1\nexit\nprint 2";

    let engine = run_script(source, hashmap! {});

    assert_eq!(output(&engine), vec!["1"]);
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_runtime_error_reports_position() {
    let (_, err) = run_script_error("x = 1\ny = nope + 1", EngineConfig::default());

    assert_eq!(err.code, "RUNTIME_ERROR");
    assert_eq!(err.line, Some(2));
    assert_eq!(err.pc, Some(1));
    assert!(err.message.contains("nope"));
    assert_eq!(err.trace[0].statement, "y = nope + 1");
}

#[test]
fn test_pop_discards_pushed_scope() {
    let source = r#"
        push
        var t = 1
        print t
        pop
        print t
    "#;

    let (engine, err) = run_script_error(source, EngineConfig::default());

    assert_eq!(output(&engine), vec!["1"]);
    assert!(err.message.contains("undefined variable 't'"));
    assert_eq!(engine.depth(), 0);
}

#[test]
fn test_pop_without_push_fails() {
    let (_, err) = run_script_error("pop", EngineConfig::default());

    assert_eq!(err.code, "RUNTIME_ERROR");
}

#[test]
fn test_registered_command_receives_evaluated_args() {
    let mut registry = CommandRegistry::with_builtins();
    registry
        .register(
            "double",
            |args: &[Val], interp: &mut Interpreter| -> Result<StepResult, EngineError> {
                let n = args.first().and_then(|v| v.as_int()).unwrap_or(0);
                interp.print((n * 2).to_string());
                Ok(StepResult::Continue)
            },
        )
        .unwrap();
    let mut engine = Engine::with_registry(
        EngineConfig::default(),
        Arc::new(MemoryHost::new(Threading::Threaded)),
        Arc::new(registry),
    );

    let outcome = engine.compile_and_run("x = 20\ndouble x + 1");

    assert!(outcome.is_completed());
    assert_eq!(output(&engine), vec!["42"]);
}

#[test]
fn test_shape_commands_share_a_handler() {
    struct Shapes;

    impl ShapeHandler for Shapes {
        fn execute(
            &self,
            shape: &str,
            args: &[Val],
            interp: &mut Interpreter,
        ) -> Result<StepResult, EngineError> {
            interp.print(format!("{} {}", shape, args.len()));
            Ok(StepResult::Continue)
        }
    }

    let handler: Arc<dyn ShapeHandler> = Arc::new(Shapes);
    let mut registry = CommandRegistry::with_builtins();
    registry.register_shape("sphere", handler.clone()).unwrap();
    registry.register_shape("cube", handler).unwrap();
    let mut engine = Engine::with_registry(
        EngineConfig::default(),
        Arc::new(MemoryHost::new(Threading::Threaded)),
        Arc::new(registry),
    );

    engine.compile_and_run("sphere 1, 2\ncube 3");

    assert_eq!(output(&engine), vec!["sphere 2", "cube 1"]);
}

#[test]
fn test_compile_error_is_reported() {
    let (mut engine, _) = build_engine(
        EngineConfig::default(),
        MemoryHost::new(Threading::Threaded),
        hashmap! {},
    );

    let outcome = engine.compile_and_run("print 1\nfrobnicate");

    let err = outcome.error().expect("Expected error");
    assert_eq!(err.code, "COMPILE_ERROR");
    assert_eq!(err.line, Some(2));
}
