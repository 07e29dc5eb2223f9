//! Configuration loading
//!
//! Settings are layered, lowest priority first:
//! 1. built-in defaults
//! 2. a TOML file (`--config`, `STANZA_CONFIG_PATH`, or `./stanza.toml` if present)
//! 3. `STANZA_*` environment variables (`STANZA_ENGINE__MAX_CONTEXT_DEPTH=50`)
//! 4. explicit builder overrides
//!
//! A `.env` file is read first so its values participate as environment variables.

use crate::host::Threading;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_CONTEXT_DEPTH: usize = 100;

/* ===================== Settings ===================== */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub queue: QueueConfig,
}

/// Per-engine execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of live contexts before pushes are refused
    pub max_context_depth: usize,

    /// Cooperative hosts yield once this much time has passed since the last yield
    pub yield_interval_ms: u64,

    /// Number of executed command lines remembered
    pub history_size: usize,

    /// Poll period while a threaded run is paused
    pub pause_poll_ms: u64,

    pub threading: Threading,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_context_depth: DEFAULT_MAX_CONTEXT_DEPTH,
            yield_interval_ms: 1000,
            history_size: 100,
            pause_poll_ms: 10,
            threading: Threading::Threaded,
        }
    }
}

impl EngineConfig {
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_interval_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker tasks started by `stanza queue`
    pub workers: usize,

    /// Maximum number of waiting submissions (0 = unbounded)
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            capacity: 0,
        }
    }
}

/* ===================== Builder ===================== */

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with default search rules and no overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_context_depth == 0 {
            bail!("engine.max_context_depth must be at least 1");
        }
        if self.queue.workers == 0 {
            bail!("queue.workers must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_context_depth: Option<usize>,
    yield_interval_ms: Option<u64>,
    threading: Option<Threading>,
    workers: Option<usize>,
}

impl ConfigBuilder {
    /// Explicit config file (overrides default search)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_context_depth(mut self, depth: Option<usize>) -> Self {
        self.max_context_depth = depth;
        self
    }

    pub fn yield_interval_ms(mut self, interval: Option<u64>) -> Self {
        self.yield_interval_ms = interval;
        self
    }

    pub fn threading(mut self, threading: Option<Threading>) -> Self {
        self.threading = threading;
        self
    }

    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn build(self) -> Result<Config> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        let explicit = self
            .config_path
            .or_else(|| std::env::var("STANZA_CONFIG_PATH").ok().map(PathBuf::from));
        builder = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("config file not found: {}", path.display());
                }
                builder.add_source(config::File::from(path).required(true))
            }
            None => builder.add_source(config::File::with_name("stanza").required(false)),
        };

        builder = builder.add_source(
            config::Environment::with_prefix("STANZA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(depth) = self.max_context_depth {
            builder = builder.set_override("engine.max_context_depth", depth as i64)?;
        }
        if let Some(interval) = self.yield_interval_ms {
            builder = builder.set_override("engine.yield_interval_ms", interval as i64)?;
        }
        if let Some(threading) = self.threading {
            builder = builder.set_override("engine.threading", threading.as_str())?;
        }
        if let Some(workers) = self.workers {
            builder = builder.set_override("queue.workers", workers as i64)?;
        }

        let config: Config = builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}
