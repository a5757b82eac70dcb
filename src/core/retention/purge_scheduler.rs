// Background scheduling for the retention purge.

use super::purge_service::run_sweep;
use crate::core::config::{RetentionSettings, SqlIdentifier};
use crate::core::connection::{ConnectionManager, Connector};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running (or finished) purge timer.
///
/// Waits `startup_delay`, sweeps, then either stops or re-arms itself every
/// `repeat_every`. Sweep failures are logged and never stop the timer.
pub struct PurgeScheduler {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PurgeScheduler {
    pub fn arm<C: Connector>(
        manager: Arc<ConnectionManager<C>>,
        table: SqlIdentifier,
        settings: RetentionSettings,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tracing::info!(
            table = %table,
            inactivity_days = settings.inactivity_days,
            delay_secs = settings.startup_delay.as_secs(),
            recurring = settings.repeat_every.is_some(),
            "Database maintenance task scheduled"
        );

        let task = tokio::spawn(async move {
            let mut delay = settings.startup_delay;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        tracing::debug!("Database maintenance task cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                let now = Utc::now().timestamp_millis();
                if let Err(e) = run_sweep(&manager, &table, settings.inactivity_days, now).await {
                    tracing::error!(table = %table, error = %e, "Database maintenance failed");
                }

                match settings.repeat_every {
                    Some(every) => delay = every,
                    None => break,
                }
            }
        });

        Self { token, task }
    }

    #[allow(dead_code)]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the timer and wait for the task to wind down. A sweep that is
    /// already running is allowed to finish.
    pub async fn cancel(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Database maintenance task ended abnormally");
        }
    }
}
