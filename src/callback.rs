//! Callback targets and delivery
//!
//! A caller's component implements `CallbackTarget` and registers it under
//! the component id named in its requests' `CallbackSpec`. On resolution the
//! dispatcher calls exactly one of the two methods with the request id only;
//! the component re-fetches the outcome through `Dispatcher::fetch_response`.

use crate::error::{RelayError, Result};
use crate::types::{CallbackSpec, RequestId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

tokio::task_local! {
    static IN_CALLBACK: RequestId;
}

/// Component-side handler pair
#[async_trait]
pub trait CallbackTarget: Send + Sync {
    /// Called once when a request resolves to Success
    async fn on_success(&self, handler: &str, request_id: RequestId) -> Result<()>;

    /// Called once when a request resolves to Failure (or Timeout, when enabled)
    async fn on_failure(&self, handler: &str, request_id: RequestId) -> Result<()>;
}

/// Which handler of a `CallbackSpec` to invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Success,
    Failure,
}

impl CallbackKind {
    /// Handler name this kind selects from `spec`
    pub fn handler<'a>(&self, spec: &'a CallbackSpec) -> &'a str {
        match self {
            CallbackKind::Success => &spec.success_handler,
            CallbackKind::Failure => &spec.failure_handler,
        }
    }
}

/// Registered callback targets (component id → target)
#[derive(Default)]
pub struct CallbackRegistry {
    targets: RwLock<HashMap<String, Arc<dyn CallbackTarget>>>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the target for a component id
    pub async fn register(&self, component: impl Into<String>, target: Arc<dyn CallbackTarget>) {
        let component = component.into();
        tracing::debug!(component = %component, "Callback target registered");
        self.targets.write().await.insert(component, target);
    }

    /// Remove a component's target; returns whether one was registered
    pub async fn unregister(&self, component: &str) -> bool {
        self.targets.write().await.remove(component).is_some()
    }

    /// Whether a target is registered for `component`
    pub async fn contains(&self, component: &str) -> bool {
        self.targets.read().await.contains_key(component)
    }

    /// Invoke one handler of `spec` for `request_id`
    ///
    /// The handler runs on its own task inside a re-entrancy scope, so
    /// mutating dispatcher calls made from it are rejected and a panic stays
    /// contained. Any failure comes back as `RelayError::Delivery`.
    pub async fn deliver(
        &self,
        spec: &CallbackSpec,
        kind: CallbackKind,
        request_id: RequestId,
    ) -> Result<()> {
        let target = self
            .targets
            .read()
            .await
            .get(&spec.target)
            .cloned()
            .ok_or_else(|| RelayError::Delivery {
                request_id,
                reason: format!("No callback target registered for '{}'", spec.target),
            })?;

        let handler = kind.handler(spec).to_string();
        let task = tokio::spawn(guarded(request_id, {
            let handler = handler.clone();
            async move {
                match kind {
                    CallbackKind::Success => target.on_success(&handler, request_id).await,
                    CallbackKind::Failure => target.on_failure(&handler, request_id).await,
                }
            }
        }));

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                return Err(RelayError::Delivery {
                    request_id,
                    reason: format!("Handler '{}' on '{}' panicked", handler, spec.target),
                });
            }
            Err(e) => {
                return Err(RelayError::Delivery {
                    request_id,
                    reason: format!("Handler '{}' on '{}' aborted: {}", handler, spec.target, e),
                });
            }
        };

        outcome.map_err(|e| match e {
            RelayError::Delivery { .. } => e,
            other => RelayError::Delivery {
                request_id,
                reason: format!("Handler '{}' on '{}' failed: {}", handler, spec.target, other),
            },
        })
    }
}

/// Run `fut` marked as executing inside a callback for `request_id`
async fn guarded<F: Future>(request_id: RequestId, fut: F) -> F::Output {
    IN_CALLBACK.scope(request_id, fut).await
}

/// Fail mutating operations issued from inside a callback handler
pub(crate) fn reject_reentry(operation: &'static str) -> Result<()> {
    match IN_CALLBACK.try_with(|id| *id) {
        Ok(request_id) => {
            tracing::warn!(
                request_id = %request_id,
                operation,
                "Re-entrant call from callback handler rejected"
            );
            Err(RelayError::Reentrant(operation))
        }
        Err(_) => Ok(()),
    }
}
