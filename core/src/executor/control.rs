//! Cross-thread run control
//!
//! `EngineControl` is a cheap clonable handle. A UI thread or signal
//! handler can pause, single-step or halt a run while the dispatch loop
//! checks the flags at every statement boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Flags {
    halted: AtomicBool,
    paused: AtomicBool,
    stepping: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct EngineControl {
    flags: Arc<Flags>,
}

impl EngineControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause at the next statement boundary
    pub fn pause(&self) {
        self.flags.stepping.store(false, Ordering::SeqCst);
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    /// Run exactly one more statement, then pause again
    pub fn step(&self) {
        self.flags.stepping.store(true, Ordering::SeqCst);
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    pub fn resume_paused(&self) {
        self.flags.stepping.store(false, Ordering::SeqCst);
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    /// Stop the run at the next statement boundary
    pub fn halt(&self) {
        self.resume_paused();
        self.flags.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.flags.halted.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    pub fn is_stepping(&self) -> bool {
        self.flags.stepping.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_pause(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.stepping.store(false, Ordering::SeqCst);
    }

    pub(crate) fn clear_halt(&self) {
        self.flags.halted.store(false, Ordering::SeqCst);
    }
}
