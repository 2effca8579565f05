//! Delivery log — callbacks that could not be delivered
//!
//! A failed callback never undoes settlement; the outcome stays available
//! through `fetch_response`. The failure is recorded here so operators (or
//! a redelivery job) can find affected requests.

use crate::error::Result;
use crate::types::RequestId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// A callback invocation that failed, with context
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub request_id: RequestId,

    /// Component id the callback was addressed to
    pub target: String,

    /// Handler name that was invoked
    pub handler: String,

    pub reason: String,

    pub failed_at: DateTime<Utc>,
}

impl DeliveryFailure {
    /// Record a failure stamped with the current time
    pub fn new(
        request_id: RequestId,
        target: impl Into<String>,
        handler: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            target: target.into(),
            handler: handler.into(),
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Sink for failed callback deliveries
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Record a failed delivery
    async fn record(&self, failure: DeliveryFailure) -> Result<()>;

    /// Number of failures currently retained
    async fn count(&self) -> Result<usize>;

    /// Most recent failures first
    async fn list(&self, limit: usize) -> Result<Vec<DeliveryFailure>>;
}

/// In-memory delivery log with a bounded capacity
///
/// Oldest entries are dropped once `max_entries` is exceeded; 0 means unbounded.
pub struct MemoryDeliveryLog {
    entries: RwLock<VecDeque<DeliveryFailure>>,
    max_entries: usize,
}

impl MemoryDeliveryLog {
    /// Create a new in-memory delivery log retaining up to `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries,
        }
    }
}

impl Default for MemoryDeliveryLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl DeliveryLog for MemoryDeliveryLog {
    async fn record(&self, failure: DeliveryFailure) -> Result<()> {
        tracing::warn!(
            request_id = %failure.request_id,
            target = %failure.target,
            handler = %failure.handler,
            reason = %failure.reason,
            "Callback delivery failed"
        );

        let mut entries = self.entries.write().await;
        entries.push_back(failure);
        while self.max_entries > 0 && entries.len() > self.max_entries {
            entries.pop_front();
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeliveryFailure>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}
