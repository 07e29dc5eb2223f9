use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::executor::{Program, RunOutcome};
use crate::host::{CooperativeHost, Host, ThreadedHost, Threading};
use crate::queue::{self, ScriptQueue};

#[derive(Parser)]
#[command(name = "stanza")]
#[command(about = "Stanza - run and inspect command scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script file
    Run {
        file: PathBuf,

        /// Suspend on delays and loads instead of blocking
        #[arg(long)]
        cooperative: bool,

        /// Maximum context depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Cooperative yield interval in milliseconds
        #[arg(long)]
        yield_interval_ms: Option<u64>,
    },

    /// Compile a script and print its statements
    Check {
        file: PathBuf,

        /// Print the compiled program as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run several scripts through the queue scheduler
    Queue {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of workers (default: from config)
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        #[arg(long)]
        cooperative: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let builder = Config::builder().config_path(cli.config);

    match cli.command {
        Commands::Run {
            file,
            cooperative,
            max_depth,
            yield_interval_ms,
        } => {
            let config = builder
                .max_context_depth(max_depth)
                .yield_interval_ms(yield_interval_ms)
                .threading(cooperative.then_some(Threading::Cooperative))
                .build()?;
            run_file(&config, &file).await?;
        }

        Commands::Check { file, json } => {
            let config = builder.build()?;
            let program = compile_file(&config, &file).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print_listing(&program);
            }
        }

        Commands::Queue {
            files,
            workers,
            cooperative,
        } => {
            let config = builder
                .workers(workers)
                .threading(cooperative.then_some(Threading::Cooperative))
                .build()?;
            run_queue(&config, files).await?;
        }

        Commands::Config => {
            let config = builder.build()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/* ===================== Commands ===================== */

fn host_for(threading: Threading) -> Arc<dyn Host> {
    match threading {
        Threading::Threaded => Arc::new(ThreadedHost),
        Threading::Cooperative => Arc::new(CooperativeHost),
    }
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn compile_file(config: &Config, path: &Path) -> Result<Program> {
    let source = read_source(path).await?;
    let engine = Engine::new(config.engine.clone(), host_for(config.engine.threading));
    Ok(engine.compile(&path.display().to_string(), &source)?)
}

fn print_listing(program: &Program) {
    for (pc, statement) in program.statements.iter().enumerate() {
        let target = statement
            .head()
            .and_then(|t| t.target())
            .map(|t| format!("-> {}", t))
            .unwrap_or_default();
        println!(
            "{:>4} {:>5}  {:<8} {}",
            pc,
            program.line(pc),
            target,
            program.statement_text(pc)
        );
    }
}

/// Run one file, completing suspensions in place. Ctrl-C halts the run.
async fn run_file(config: &Config, path: &Path) -> Result<()> {
    let program = Arc::new(compile_file(config, path).await?);
    let engine = Engine::new(config.engine.clone(), host_for(config.engine.threading));
    let control = engine.control();
    let pause_poll = config.engine.pause_poll();

    let interrupt = tokio::spawn({
        let control = control.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, halting");
                control.halt();
            }
        }
    });

    info!(file = %path.display(), threading = config.engine.threading.as_str(), "running");
    let (mut engine, mut outcome) =
        queue::on_blocking_pool(engine, move |e| e.run(program)).await?;
    while let RunOutcome::Pending(suspension) = outcome {
        debug!(key = %suspension.key, reason = ?suspension.reason, "suspended");
        let completion = queue::complete_operation(&suspension, &control, pause_poll).await;
        let handle = suspension.handle;
        (engine, outcome) =
            queue::on_blocking_pool(engine, move |e| e.resume(handle, completion)).await?;
    }
    interrupt.abort();

    match outcome {
        RunOutcome::Error(err) => Err(err.into()),
        _ => Ok(()),
    }
}

async fn run_queue(config: &Config, files: Vec<PathBuf>) -> Result<()> {
    let queue = Arc::new(ScriptQueue::new(
        config.engine.clone(),
        config.queue.clone(),
        host_for(config.engine.threading),
    ));
    let cancel = CancellationToken::new();
    let workers: Vec<_> = (0..config.queue.workers)
        .map(|id| tokio::spawn(queue::run_worker(queue.clone(), id, cancel.clone())))
        .collect();

    let mut receivers = Vec::new();
    for path in &files {
        let source = read_source(path).await?;
        let (_, rx) = queue.submit(&path.display().to_string(), source)?;
        receivers.push((path, rx));
    }

    let mut failed = 0;
    for (path, rx) in receivers {
        let result = rx.await.context("Worker stopped before finishing")?;
        let elapsed = result.finished_at - result.submitted_at;
        match &result.outcome {
            RunOutcome::Error(err) => {
                failed += 1;
                eprintln!("✗ {} ({}ms)\n{}", path.display(), elapsed.num_milliseconds(), err);
            }
            _ => println!("✓ {} ({}ms)", path.display(), elapsed.num_milliseconds()),
        }
    }

    cancel.cancel();
    for worker in workers {
        worker.await.context("Worker task panicked")??;
    }

    if failed > 0 {
        bail!("{} of {} scripts failed", failed, files.len());
    }
    Ok(())
}
