use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::TimelineEngine;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Drives [`TimelineEngine::run_pipeline`] on a fixed cadence.
///
/// Hosts without their own wake scheduling start one of these; hosts that
/// wake the engine themselves call `run_pipeline` directly instead.
pub struct PipelineRunner {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, engine: Arc<TimelineEngine>, every: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("pipeline runner already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let handle = tokio::spawn(pipeline_loop(engine, every, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for the in-flight run to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("pipeline loop task failed to join")?;
        }
        Ok(())
    }
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new()
    }
}

async fn pipeline_loop(
    engine: Arc<TimelineEngine>,
    every: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.run_pipeline().await {
                    Ok(summary) => {
                        if summary.merged_events > 0 {
                            log_info!(
                                "Scheduled run applied {} events across {} days",
                                summary.merged_events,
                                summary.days_persisted
                            );
                        }
                    }
                    Err(err) => log_error!("Scheduled pipeline run failed: {err:#}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("Pipeline runner shutting down");
                break;
            }
        }
    }
}
