//! Host capabilities
//!
//! The engine never blocks or performs I/O on its own; it asks the host.
//! The host's `threading()` decides whether delays and file loads block in
//! place (threaded) or suspend the script so the caller's event loop can
//! complete them and resume (cooperative).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Threading {
    /// Blocking waits are permitted
    #[default]
    Threaded,
    /// Single host thread; waits become suspensions
    Cooperative,
}

impl Threading {
    pub fn as_str(&self) -> &'static str {
        match self {
            Threading::Threaded => "threaded",
            Threading::Cooperative => "cooperative",
        }
    }
}

pub trait Host: Send + Sync {
    fn threading(&self) -> Threading;

    /// Only called by threaded hosts
    fn sleep(&self, duration: Duration);

    fn read_file(&self, path: &str) -> std::io::Result<String>;

    /// Receives every printed line
    fn echo(&self, _line: &str) {}
}

/* ===================== Std hosts ===================== */

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedHost;

impl Host for ThreadedHost {
    fn threading(&self) -> Threading {
        Threading::Threaded
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn read_file(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn echo(&self, line: &str) {
        println!("{}", line);
    }
}

/// Host for a single-threaded event loop.
///
/// `read_file` is still provided for paths the engine must read
/// synchronously (nested runs that cannot suspend).
#[derive(Debug, Default, Clone, Copy)]
pub struct CooperativeHost;

impl Host for CooperativeHost {
    fn threading(&self) -> Threading {
        Threading::Cooperative
    }

    fn sleep(&self, _duration: Duration) {}

    fn read_file(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn echo(&self, line: &str) {
        println!("{}", line);
    }
}

/* ===================== In-memory host ===================== */

/// Host backed by an in-memory file map that records sleeps and echoes
/// instead of performing them.
#[derive(Debug, Default)]
pub struct MemoryHost {
    threading: Threading,
    files: HashMap<String, String>,
    slept: Mutex<Vec<Duration>>,
    echoed: Mutex<Vec<String>>,
}

impl MemoryHost {
    pub fn new(threading: Threading) -> Self {
        Self {
            threading,
            ..Default::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(path.into(), text.into());
        self
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn echoed(&self) -> Vec<String> {
        self.echoed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Host for MemoryHost {
    fn threading(&self) -> Threading {
        self.threading
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }

    fn read_file(&self, path: &str) -> std::io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such file: {}", path))
        })
    }

    fn echo(&self, line: &str) {
        if let Ok(mut echoed) = self.echoed.lock() {
            echoed.push(line.to_string());
        }
    }
}
