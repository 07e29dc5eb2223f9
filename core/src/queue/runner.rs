//! Queue worker

use super::{Claimed, ScriptQueue, SubmissionId, SubmissionStatus};
use crate::engine::Engine;
use crate::executor::{Completion, EngineControl, RunOutcome, SuspendReason, Suspension};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Claim and run submissions until `cancel` fires.
///
/// Engine calls run on the blocking pool so threaded hosts may sleep in
/// place without stalling the runtime.
pub async fn run_worker(
    queue: Arc<ScriptQueue>,
    worker_id: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let span = info_span!("worker", id = worker_id);
    async move {
        let mut engine = Engine::new(queue.engine_config().clone(), queue.host());
        let halter = tokio::spawn({
            let cancel = cancel.clone();
            let control = engine.control();
            async move {
                cancel.cancelled().await;
                control.halt();
            }
        });
        info!("worker started");

        loop {
            let claimed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("worker received shutdown signal");
                    break;
                }
                claimed = queue.claim(worker_id) => claimed,
            };
            engine = run_submission(&queue, engine, claimed, &cancel).await?;
        }

        halter.abort();
        info!("worker stopped");
        Ok(())
    }
    .instrument(span)
    .await
}

pub(super) async fn run_submission(
    queue: &Arc<ScriptQueue>,
    engine: Engine,
    claimed: Claimed,
    cancel: &CancellationToken,
) -> Result<Engine> {
    let Claimed { id, name, source } = claimed;
    info!(%id, name = %name, "running submission");

    let program = match engine.compile(&name, &source) {
        Ok(program) => Arc::new(program),
        Err(err) => {
            warn!(%id, error = %err, "submission failed to compile");
            queue.finish(id, RunOutcome::Error(err.into()), Vec::new());
            return Ok(engine);
        }
    };

    let token = cancel.clone();
    let (mut engine, mut outcome) =
        on_blocking_pool(engine, move |e| e.run_until(program, || token.is_cancelled())).await?;

    while let RunOutcome::Pending(suspension) = outcome {
        queue.set_status(id, SubmissionStatus::Suspended);
        debug!(%id, key = %suspension.key, reason = ?suspension.reason, "submission suspended");

        let waiter = queue.register(id, suspension.key.clone());
        tokio::spawn(drive_operation(
            queue.clone(),
            id,
            suspension.clone(),
            engine.control(),
            queue.engine_config().pause_poll(),
        ));

        let completion = tokio::select! {
            _ = cancel.cancelled() => {
                queue.unregister(id, &suspension.key);
                engine.halt();
                Completion::Elapsed
            }
            completion = waiter => completion.unwrap_or(Completion::Elapsed),
        };

        queue.set_status(id, SubmissionStatus::Running);
        let handle = suspension.handle;
        (engine, outcome) = on_blocking_pool(engine, move |e| e.resume(handle, completion)).await?;
    }

    if let RunOutcome::Error(err) = &outcome {
        error!(%id, code = %err.code, message = %err.message, "submission failed");
    } else {
        info!(%id, "submission completed");
    }
    let output = engine.take_output();
    queue.finish(id, outcome, output);
    Ok(engine)
}

pub(crate) async fn on_blocking_pool<F>(mut engine: Engine, f: F) -> Result<(Engine, RunOutcome)>
where
    F: FnOnce(&mut Engine) -> RunOutcome + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let outcome = f(&mut engine);
        (engine, outcome)
    })
    .await
    .context("Engine task panicked")
}

/// Complete the operation a suspension waits on, then resume it
async fn drive_operation(
    queue: Arc<ScriptQueue>,
    id: SubmissionId,
    suspension: Suspension,
    control: EngineControl,
    pause_poll: Duration,
) {
    let completion = complete_operation(&suspension, &control, pause_poll).await;
    queue.resume(id, &suspension.key, completion);
}

/// Perform what a suspended run is waiting on.
///
/// A pause completes once the run is resumed or halted.
pub(crate) async fn complete_operation(
    suspension: &Suspension,
    control: &EngineControl,
    pause_poll: Duration,
) -> Completion {
    match &suspension.reason {
        SuspendReason::Delay => {
            tokio::time::sleep(suspension.delay.unwrap_or_default()).await;
            Completion::Elapsed
        }
        SuspendReason::Yield => {
            tokio::task::yield_now().await;
            Completion::Elapsed
        }
        SuspendReason::Load { path } => match tokio::fs::read_to_string(path).await {
            Ok(text) => Completion::Loaded(text),
            Err(e) => Completion::Failed(e.to_string()),
        },
        SuspendReason::Pause => {
            while control.is_paused() {
                tokio::time::sleep(pause_poll).await;
            }
            Completion::Elapsed
        }
    }
}
