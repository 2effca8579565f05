//! Response dispatcher — the relay's public entry point
//!
//! `Dispatcher` owns the session ledger, the request registry, the stored
//! responses and the `AllOf` consensus buffers behind a single lock, so every
//! mutation is atomic and totally ordered. The trust oracle is consulted
//! between two short critical sections, never under the lock. Callbacks run
//! on detached tasks after the lock is released and never roll back a
//! committed settlement.

use crate::callback::{reject_reentry, CallbackKind, CallbackRegistry, CallbackTarget};
use crate::config::RelayConfig;
use crate::delivery::{DeliveryFailure, DeliveryLog, MemoryDeliveryLog};
use crate::error::{RelayError, Result};
use crate::events::{DiscardReason, RelayEvent};
use crate::ledger::SessionLedger;
use crate::policy::{
    ConsensusBuffer, Contribution, PolicyEvaluator, Rejection, TrustOracle, Verdict,
};
use crate::registry::RequestRegistry;
use crate::types::{
    CallbackSpec, FetchedResponse, NodeId, Outcome, Request, RequestId, RequestSpec,
    RequestStatus, Response, Session, SessionId,
};
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

const PAYMENT_FAILED: &str = "payment failed";
const CONSENSUS_MISMATCH: &str = "consensus mismatch";
const TIMED_OUT: &str = "request timed out";

/// Everything guarded by the dispatcher's single-writer lock
struct RelayState {
    ledger: SessionLedger,
    registry: RequestRegistry,
    responses: HashMap<RequestId, Response>,
    buffers: HashMap<RequestId, ConsensusBuffer>,
}

impl RelayState {
    /// Commit a terminal outcome for a Pending request
    fn commit(&mut self, response: Response) -> Result<()> {
        self.registry.resolve(response.request_id, response.status)?;
        self.buffers.remove(&response.request_id);
        self.responses.insert(response.request_id, response);
        Ok(())
    }
}

/// Session-escrowed request router
///
/// Thread-safe; share it behind an `Arc`.
pub struct Dispatcher {
    state: Mutex<RelayState>,
    evaluator: PolicyEvaluator,
    callbacks: Arc<CallbackRegistry>,
    delivery_log: Arc<dyn DeliveryLog>,
    events: broadcast::Sender<RelayEvent>,
    config: RelayConfig,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration
    pub fn new(oracle: Arc<dyn TrustOracle>) -> Self {
        Self::build(RelayConfig::default(), oracle)
    }

    /// Create a dispatcher with explicit configuration
    ///
    /// Fails with `RelayError::Config` if `config` does not validate.
    pub fn with_config(config: RelayConfig, oracle: Arc<dyn TrustOracle>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, oracle))
    }

    fn build(config: RelayConfig, oracle: Arc<dyn TrustOracle>) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            state: Mutex::new(RelayState {
                ledger: SessionLedger::new(),
                registry: RequestRegistry::new(config.max_payload_bytes),
                responses: HashMap::new(),
                buffers: HashMap::new(),
            }),
            evaluator: PolicyEvaluator::new(oracle),
            callbacks: Arc::new(CallbackRegistry::new()),
            delivery_log: Arc::new(MemoryDeliveryLog::new(config.delivery_log_capacity)),
            events,
            config,
        }
    }

    /// Replace the delivery log (e.g. with a persistent one)
    pub fn with_delivery_log(mut self, log: Arc<dyn DeliveryLog>) -> Self {
        self.delivery_log = log;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Callback target registry
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Register a callback target under a component id
    pub async fn register_callback(
        &self,
        component: impl Into<String>,
        target: Arc<dyn CallbackTarget>,
    ) {
        self.callbacks.register(component, target).await;
    }

    /// Log of callbacks that could not be delivered
    pub fn delivery_log(&self) -> &Arc<dyn DeliveryLog> {
        &self.delivery_log
    }

    /// Subscribe to relay events
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Relay events as a stream
    pub fn events(&self) -> BroadcastStream<RelayEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    // ─── Sessions ───────────────────────────────────────────────

    /// Open a funded session for `owner`
    pub async fn open_session(&self, owner: &str, amount: u64) -> Result<SessionId> {
        let session_id = self.state.lock().await.ledger.open(owner, amount)?;

        tracing::info!(session_id = %session_id, owner, amount, "Session opened");
        self.emit(RelayEvent::SessionOpened {
            session_id: session_id.clone(),
            owner: owner.to_string(),
            amount,
        });
        Ok(session_id)
    }

    /// Close a session; returns the residual balance to refund to the owner
    pub async fn close_session(&self, session_id: &SessionId, caller: &str) -> Result<u64> {
        reject_reentry("close_session")?;
        let residual = self.state.lock().await.ledger.close(session_id, caller)?;

        tracing::info!(session_id = %session_id, residual, "Session closed");
        self.emit(RelayEvent::SessionClosed {
            session_id: session_id.clone(),
            residual,
        });
        Ok(residual)
    }

    /// Let `delegate` submit requests billed to the owner's session
    pub async fn grant_access(
        &self,
        session_id: &SessionId,
        owner: &str,
        delegate: &str,
    ) -> Result<()> {
        self.state.lock().await.ledger.grant(session_id, owner, delegate)?;
        tracing::debug!(session_id = %session_id, delegate, "Session access granted");
        Ok(())
    }

    /// Withdraw a delegate's access; returns whether it had access
    pub async fn revoke_access(
        &self,
        session_id: &SessionId,
        owner: &str,
        delegate: &str,
    ) -> Result<bool> {
        self.state.lock().await.ledger.revoke(session_id, owner, delegate)
    }

    /// Snapshot of a session, including closed ones
    pub async fn session(&self, session_id: &SessionId) -> Result<Session> {
        self.state.lock().await.ledger.get(session_id).cloned()
    }

    // ─── Requests ───────────────────────────────────────────────

    /// Submit a request billed to `spec.session_id`
    pub async fn submit_request(
        &self,
        spec: RequestSpec,
        caller: &str,
        escrow_budget: u64,
    ) -> Result<RequestId> {
        let session_id = spec.session_id.clone();
        let request_id = {
            let mut state = self.state.lock().await;
            let RelayState {
                ledger, registry, ..
            } = &mut *state;
            registry.submit(ledger, spec, caller, escrow_budget)?
        };

        tracing::info!(
            request_id = %request_id,
            session_id = %session_id,
            caller,
            "Request submitted"
        );
        self.emit(RelayEvent::RequestSubmitted {
            request_id,
            session_id,
        });
        Ok(request_id)
    }

    /// Snapshot of a submitted request
    pub async fn request(&self, request_id: RequestId) -> Result<Request> {
        self.state.lock().await.registry.get(request_id).cloned()
    }

    /// Request ids submitted by `owner`, oldest first
    pub async fn submissions(&self, owner: &str) -> Vec<RequestId> {
        self.state.lock().await.registry.submissions(owner)
    }

    /// Requests still awaiting a terminal outcome, oldest first
    pub async fn pending_requests(&self) -> Vec<Request> {
        self.state.lock().await.registry.pending().cloned().collect()
    }

    // ─── Responses ──────────────────────────────────────────────

    /// Accept a worker's response for a request
    ///
    /// Responses for already-resolved requests and from non-authoritative
    /// nodes are discarded without error. Returns the request's status
    /// after the call.
    pub async fn submit_response(
        &self,
        request_id: RequestId,
        outcome: Outcome,
        message: impl Into<String>,
        payload: impl Into<Bytes>,
        node_id: impl Into<NodeId>,
    ) -> Result<RequestStatus> {
        reject_reentry("submit_response")?;
        let node_id = node_id.into();
        if node_id.as_str().is_empty() {
            return Err(RelayError::Validation("Node id cannot be empty".to_string()));
        }
        let contribution = Contribution::new(outcome, message, payload);

        // Routing policies never change after submission
        let policy = {
            let state = self.state.lock().await;
            let request = state.registry.get(request_id)?;
            if request.status.is_terminal() {
                let status = request.status;
                drop(state);
                self.discard_late(request_id, node_id);
                return Ok(status);
            }
            request.routing_policy.clone()
        };

        // The oracle may be slow or call back into the dispatcher
        let authorized = self.evaluator.authorize(&policy, &node_id).await;

        let (response, callback) = {
            let mut state = self.state.lock().await;
            let request = state.registry.get(request_id)?;
            if request.status.is_terminal() {
                let status = request.status;
                drop(state);
                self.discard_late(request_id, node_id);
                return Ok(status);
            }

            let fee_schedule = request.fee_schedule;
            let session_id = request.session_id.clone();
            let callback = request.callback.clone();

            let buffer = state.buffers.entry(request_id).or_default();
            let verdict =
                self.evaluator.evaluate(&policy, &node_id, authorized, contribution, buffer);

            let response = match verdict {
                Verdict::Reject(Rejection::Unauthorized) => {
                    if state.buffers.get(&request_id).is_some_and(|b| b.is_empty()) {
                        state.buffers.remove(&request_id);
                    }
                    drop(state);
                    tracing::warn!(
                        request_id = %request_id,
                        node = %node_id,
                        "Response from unauthorized node discarded"
                    );
                    self.emit(RelayEvent::ResponseDiscarded {
                        request_id,
                        node_id,
                        reason: DiscardReason::Unauthorized,
                    });
                    return Ok(RequestStatus::Pending);
                }
                Verdict::AwaitMore { received, required } => {
                    drop(state);
                    tracing::debug!(
                        request_id = %request_id,
                        node = %node_id,
                        received,
                        required,
                        "Contribution buffered"
                    );
                    self.emit(RelayEvent::ContributionBuffered {
                        request_id,
                        node_id,
                        received,
                        required,
                    });
                    return Ok(RequestStatus::Pending);
                }
                Verdict::Reject(Rejection::ConsensusMismatch) => {
                    tracing::warn!(
                        error = %RelayError::ConsensusMismatch(request_id),
                        node = %node_id,
                        "Resolving request as failed"
                    );
                    Response {
                        request_id,
                        status: RequestStatus::Failure,
                        message: CONSENSUS_MISMATCH.to_string(),
                        payload: Bytes::new(),
                        node_id: Some(node_id),
                        timestamp: Utc::now(),
                        fee: 0,
                    }
                }
                Verdict::Accept(accepted) => {
                    let fee = fee_schedule.fee_for(accepted.payload.len());
                    match state.ledger.charge(&session_id, fee) {
                        Ok(remaining) => {
                            tracing::debug!(
                                request_id = %request_id,
                                session_id = %session_id,
                                fee,
                                remaining,
                                "Settlement charged"
                            );
                            Response {
                                request_id,
                                status: accepted.outcome.into(),
                                message: accepted.message,
                                payload: accepted.payload,
                                node_id: Some(node_id),
                                timestamp: Utc::now(),
                                fee,
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %request_id,
                                session_id = %session_id,
                                fee,
                                error = %e,
                                "Settlement failed"
                            );
                            Response {
                                request_id,
                                status: RequestStatus::Failure,
                                message: PAYMENT_FAILED.to_string(),
                                payload: Bytes::new(),
                                node_id: Some(node_id),
                                timestamp: Utc::now(),
                                fee: 0,
                            }
                        }
                    }
                }
            };

            state.commit(response.clone())?;
            (response, callback)
        };

        tracing::info!(
            request_id = %request_id,
            status = %response.status,
            fee = response.fee,
            "Request resolved"
        );
        self.emit(RelayEvent::RequestResolved {
            request_id,
            status: response.status,
            fee: response.fee,
        });

        let kind = if response.status == RequestStatus::Success {
            CallbackKind::Success
        } else {
            CallbackKind::Failure
        };
        // Awaited, but the delivery task outlives a dropped caller
        if let Err(e) = self.notify(callback, kind, request_id).await {
            tracing::warn!(request_id = %request_id, error = %e, "Callback delivery task failed");
        }

        Ok(response.status)
    }

    /// Current outcome of a request: `(Pending, "", [])` until resolved
    pub async fn fetch_response(&self, request_id: RequestId) -> Result<FetchedResponse> {
        let state = self.state.lock().await;
        state.registry.get(request_id)?;
        Ok(state
            .responses
            .get(&request_id)
            .map(FetchedResponse::from)
            .unwrap_or_else(FetchedResponse::pending))
    }

    /// Full stored response, if the request has resolved
    pub async fn response(&self, request_id: RequestId) -> Result<Option<Response>> {
        let state = self.state.lock().await;
        state.registry.get(request_id)?;
        Ok(state.responses.get(&request_id).cloned())
    }

    /// Move a Pending request to Timeout
    ///
    /// Invoked by an external liveness monitor. Returns false if the request
    /// had already resolved.
    pub async fn expire(&self, request_id: RequestId) -> Result<bool> {
        reject_reentry("expire")?;
        let callback = {
            let mut state = self.state.lock().await;
            let request = state.registry.get(request_id)?;
            if request.status.is_terminal() {
                return Ok(false);
            }
            let callback = request.callback.clone();
            state.commit(Response {
                request_id,
                status: RequestStatus::Timeout,
                message: TIMED_OUT.to_string(),
                payload: Bytes::new(),
                node_id: None,
                timestamp: Utc::now(),
                fee: 0,
            })?;
            callback
        };

        tracing::info!(request_id = %request_id, "Request timed out");
        self.emit(RelayEvent::RequestTimedOut { request_id });

        if self.config.notify_on_timeout {
            if let Err(e) = self.notify(callback, CallbackKind::Failure, request_id).await {
                tracing::warn!(
                    request_id = %request_id,
                    error = %e,
                    "Callback delivery task failed"
                );
            }
        }
        Ok(true)
    }

    fn discard_late(&self, request_id: RequestId, node_id: NodeId) {
        tracing::debug!(
            request_id = %request_id,
            node = %node_id,
            "Late response for resolved request discarded"
        );
        self.emit(RelayEvent::ResponseDiscarded {
            request_id,
            node_id,
            reason: DiscardReason::AlreadyResolved,
        });
    }

    /// Deliver one callback on a detached task, recording (never
    /// propagating) any failure
    fn notify(
        &self,
        spec: CallbackSpec,
        kind: CallbackKind,
        request_id: RequestId,
    ) -> JoinHandle<()> {
        let callbacks = Arc::clone(&self.callbacks);
        let delivery_log = Arc::clone(&self.delivery_log);
        let events = self.events.clone();

        tokio::spawn(async move {
            let Err(e) = callbacks.deliver(&spec, kind, request_id).await else {
                return;
            };

            let reason = match &e {
                RelayError::Delivery { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            let failure =
                DeliveryFailure::new(request_id, &spec.target, kind.handler(&spec), &reason);
            if let Err(log_err) = delivery_log.record(failure).await {
                tracing::warn!(
                    request_id = %request_id,
                    error = %log_err,
                    "Failed to record delivery failure"
                );
            }
            let _ = events.send(RelayEvent::DeliveryFailed { request_id, reason });
        })
    }

    fn emit(&self, event: RelayEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
