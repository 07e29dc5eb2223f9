//! Test helpers for executor tests
//!
//! Common utilities for compiling scripts, building engines and driving
//! suspended runs to completion

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::errors::ScriptError;
use crate::executor::{Completion, RunOutcome, SuspendReason, Val};
use crate::host::{MemoryHost, Threading};
use std::collections::HashMap;
use std::sync::Arc;

/// Build an engine over a `MemoryHost` with the given globals seeded
pub fn build_engine(
    config: EngineConfig,
    host: MemoryHost,
    globals: HashMap<String, Val>,
) -> (Engine, Arc<MemoryHost>) {
    let host = Arc::new(host);
    let mut engine = Engine::new(config, host.clone());
    for (name, value) in globals {
        engine.set_global(&name, value);
    }
    (engine, host)
}

/// Compile `source`, check the program serializes, and start it
pub fn start(engine: &mut Engine, source: &str) -> RunOutcome {
    let program = engine.compile("test", source).expect("Compile failed");
    serde_json::to_string(&program).expect("Program serialization failed");
    engine.run(Arc::new(program))
}

/// Run a script on a threaded in-memory host and expect it to complete
///
/// # Returns
/// The engine, for inspecting output, globals and history
pub fn run_script(source: &str, globals: HashMap<String, Val>) -> Engine {
    let (mut engine, _) = build_engine(
        EngineConfig::default(),
        MemoryHost::new(Threading::Threaded),
        globals,
    );
    match start(&mut engine, source) {
        RunOutcome::Completed => engine,
        other => panic!("Expected completion, got {:?}", other),
    }
}

/// Run a script that is expected to fail
pub fn run_script_error(source: &str, config: EngineConfig) -> (Engine, ScriptError) {
    let (mut engine, _) = build_engine(config, MemoryHost::new(Threading::Threaded), HashMap::new());
    match start(&mut engine, source) {
        RunOutcome::Error(err) => (engine, err),
        other => panic!("Expected error, got {:?}", other),
    }
}

/// Play the embedder: complete every suspension until the run finishes.
///
/// Delays and yields complete immediately, loads are served from the
/// host's file map, and pauses are released before resuming.
///
/// # Returns
/// The final outcome and the reasons of every suspension seen
pub fn drive(
    engine: &mut Engine,
    host: &MemoryHost,
    mut outcome: RunOutcome,
) -> (RunOutcome, Vec<SuspendReason>) {
    let mut seen = Vec::new();
    for _ in 0..10_000 {
        let suspension = match outcome {
            RunOutcome::Pending(suspension) => suspension,
            done => return (done, seen),
        };
        let completion = match &suspension.reason {
            SuspendReason::Load { path } => match host.file(path) {
                Some(text) => Completion::Loaded(text.to_string()),
                None => Completion::Failed(format!("{} not found", path)),
            },
            SuspendReason::Pause => {
                engine.resume_paused();
                Completion::Elapsed
            }
            SuspendReason::Delay | SuspendReason::Yield => Completion::Elapsed,
        };
        seen.push(suspension.reason.clone());
        outcome = engine.resume(suspension.handle, completion);
    }
    panic!("run did not finish after 10000 resumptions");
}

pub fn output(engine: &Engine) -> Vec<&str> {
    engine.output().iter().map(String::as_str).collect()
}
