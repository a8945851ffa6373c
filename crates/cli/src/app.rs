//! Watch one line until its falling edge is confirmed

use crate::config::WatchConfig;
use anyhow::{bail, Context, Result};
use gpio::{GpioLines, SysfsControl};
use std::future::pending;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tracing::{info, warn};
use trigger_core::EventLoopError;
use watcher::{Action, ActionOutput, LineSampler, Outcome, PinSampler, PinTrigger, ShellAction};

/// How a run ended without error
#[derive(Debug)]
pub enum RunOutcome {
    /// The edge held and the command ran
    Triggered(ActionOutput),
    /// SIGINT or SIGTERM arrived first
    Interrupted,
}

/// Watch the configured sysfs line
pub async fn run(config: &WatchConfig) -> Result<RunOutcome> {
    let control = SysfsControl::new(&config.sysfs_root);
    run_with(config, Arc::new(GpioLines::new(Arc::new(control)))).await
}

/// Watch `config.pin` on an existing registry
///
/// Every line in `lines` is released before this returns, whatever the
/// outcome.
pub async fn run_with(config: &WatchConfig, lines: Arc<GpioLines>) -> Result<RunOutcome> {
    lines
        .initialize()
        .context("Failed to start the event loop")?;
    let failure = lines.event_loop().take_failure_signal();

    let result = match lines.open(config.pin) {
        Ok(()) => watch_until_done(config, &lines, failure).await,
        Err(e) => Err(e).with_context(|| format!("Failed to open gpio{}", config.pin)),
    };

    let finalized = lines.finalize();
    let outcome = result?;
    finalized.context("Failed to release gpio lines")?;
    Ok(outcome)
}

async fn watch_until_done(
    config: &WatchConfig,
    lines: &Arc<GpioLines>,
    failure: Option<oneshot::Receiver<EventLoopError>>,
) -> Result<RunOutcome> {
    let pin = config.pin;
    let sampler: Arc<dyn LineSampler> = Arc::new(PinSampler::new(Arc::clone(lines), pin));
    let action: Arc<dyn Action> = Arc::new(ShellAction::new(config.command.clone()));
    let (trigger, mut outcomes) =
        PinTrigger::new(pin, config.policy(), sampler, action, Handle::current());

    trigger
        .arm(lines)
        .with_context(|| format!("Failed to watch gpio{}", pin))?;
    info!(
        pin,
        hold_ticks = config.time,
        tick_ms = config.tick_ms,
        "Waiting for falling edge"
    );

    let dispatch_failed = async move {
        match failure {
            Some(rx) => match rx.await {
                Ok(e) => e,
                // Sender dropped on a clean shutdown
                Err(_) => pending().await,
            },
            None => pending().await,
        }
    };
    tokio::pin!(dispatch_failed);

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    loop {
        tokio::select! {
            outcome = outcomes.recv() => match outcome {
                Some(Outcome::Confirmed(fired)) => {
                    let output = fired.context("Failed to run command")?;
                    info!(pin, status = ?output.status, "Command finished");
                    // Cleanup is best effort once the command has run.
                    if let Err(e) = lines.unwatch(pin) {
                        warn!(pin, error = %e, "Failed to unwatch line");
                    }
                    if let Err(e) = lines.close(pin) {
                        warn!(pin, error = %e, "Failed to close line");
                    }
                    return Ok(RunOutcome::Triggered(output));
                }
                Some(Outcome::Aborted { baseline, observed, elapsed }) => {
                    info!(pin, baseline, observed, elapsed, "Edge did not hold, still waiting");
                }
                None => bail!("Trigger for gpio{} stopped unexpectedly", pin),
            },
            error = &mut dispatch_failed => {
                return Err(error).context("Event loop failed");
            }
            signaled = tokio::signal::ctrl_c() => {
                signaled.context("Failed to listen for SIGINT")?;
                warn!(pin, "Interrupted, releasing line");
                return Ok(RunOutcome::Interrupted);
            }
            _ = terminate.recv() => {
                warn!(pin, "Terminated, releasing line");
                return Ok(RunOutcome::Interrupted);
            }
        }
    }
}
