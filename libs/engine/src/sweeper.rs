//! Stale-execution sweeper
//!
//! An execution whose coordinator died mid-run keeps its header in RUNNING
//! forever. This background task is the sole post-crash recovery mechanism:
//! it scans for RUNNING headers that have not been touched within twice the
//! execution timeout and rewrites them to FAILED. Resume is out of scope;
//! re-runs require a new execution.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use maestro_db::ExecutionRepository;
use maestro_domain::ExecutionStatus;

use crate::coordinator::ERROR_TYPE_CRASHED;

/// Default interval between sweep passes
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that fails abandoned RUNNING executions
pub struct StaleExecutionSweeper {
    executions: Arc<dyn ExecutionRepository>,
    execution_timeout: Duration,
    interval: Duration,
}

impl StaleExecutionSweeper {
    #[must_use]
    pub fn new(executions: Arc<dyn ExecutionRepository>, execution_timeout: Duration) -> Self {
        Self {
            executions,
            execution_timeout,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the scan interval.
    #[must_use]
    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    /// Run one sweep pass; returns how many executions were failed.
    pub async fn sweep_once(&self) -> usize {
        let stale_after = self.execution_timeout * 2;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(1200));

        let stale = match self.executions.find_stale_running(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!("stale-execution scan failed: {e}");
                return 0;
            }
        };

        let mut swept = 0;
        for execution_id in stale {
            let message = format!(
                "{ERROR_TYPE_CRASHED}: execution was abandoned by its coordinator"
            );
            match self
                .executions
                .set_terminal(
                    &execution_id,
                    ExecutionStatus::Failed,
                    Some(&message),
                    Utc::now(),
                )
                .await
            {
                Ok(()) => {
                    info!(execution_id = %execution_id, "swept stale execution to FAILED");
                    swept += 1;
                }
                // Lost a race with its own coordinator or a previous sweep
                Err(e) => warn!(execution_id = %execution_id, "sweep failed: {e}"),
            }
        }
        swept
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
