//! Liveness monitor — expires requests no worker answered in time
//!
//! The protocol core owns no timers. This monitor is the explicit
//! collaborator that decides when a Pending request has waited too long
//! and injects the Timeout transition through `Dispatcher::expire`.

use crate::config::RelayConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{RelayError, Result};
use crate::types::RequestId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Periodically expires Pending requests older than a deadline
pub struct LivenessMonitor {
    dispatcher: Arc<Dispatcher>,
    deadline: chrono::Duration,
    sweep_interval: Duration,
}

impl LivenessMonitor {
    /// Build a monitor using the dispatcher's configured deadline and interval
    pub fn new(dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let config: RelayConfig = dispatcher.config().clone();
        Self::with_deadline(dispatcher, config.request_deadline(), config.sweep_interval())
    }

    /// Build a monitor with an explicit deadline and sweep interval
    pub fn with_deadline(
        dispatcher: Arc<Dispatcher>,
        deadline: Duration,
        sweep_interval: Duration,
    ) -> Result<Self> {
        if sweep_interval.is_zero() {
            return Err(RelayError::Config(
                "Sweep interval must be greater than 0".to_string(),
            ));
        }
        let deadline = chrono::Duration::from_std(deadline)
            .map_err(|e| RelayError::Config(format!("Invalid request deadline: {}", e)))?;
        Ok(Self {
            dispatcher,
            deadline,
            sweep_interval,
        })
    }

    /// Expire every Pending request submitted at least `deadline` before `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<RequestId>> {
        let overdue: Vec<RequestId> = self
            .dispatcher
            .pending_requests()
            .await
            .into_iter()
            .filter(|r| now.signed_duration_since(r.submitted_at) >= self.deadline)
            .map(|r| r.id)
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for request_id in overdue {
            // A worker may have answered between the listing and now
            if self.dispatcher.expire(request_id).await? {
                expired.push(request_id);
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue requests");
        }
        Ok(expired)
    }

    /// Sweep on a fixed interval until `shutdown` flips to true or its sender drops
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            deadline_ms = self.deadline.num_milliseconds(),
            interval_ms = self.sweep_interval.as_millis() as u64,
            "Liveness monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        tracing::warn!(error = %e, "Liveness sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Liveness monitor stopped");
    }

    /// Run the monitor on a background task
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
