//! Observability events emitted by the dispatcher
//!
//! Events are broadcast best-effort: a lagging or absent subscriber never
//! affects the protocol operation that produced the event.

use crate::types::{NodeId, RequestId, RequestStatus, SessionId};

/// Why a worker response was dropped without changing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Request had already reached a terminal state
    AlreadyResolved,
    /// Responder is not authoritative under the request's routing policy
    Unauthorized,
}

/// Relay lifecycle events for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    SessionOpened {
        session_id: SessionId,
        owner: String,
        amount: u64,
    },
    SessionClosed {
        session_id: SessionId,
        residual: u64,
    },
    RequestSubmitted {
        request_id: RequestId,
        session_id: SessionId,
    },
    /// An `AllOf` contribution was buffered; the request stays Pending
    ContributionBuffered {
        request_id: RequestId,
        node_id: NodeId,
        received: usize,
        required: usize,
    },
    ResponseDiscarded {
        request_id: RequestId,
        node_id: NodeId,
        reason: DiscardReason,
    },
    RequestResolved {
        request_id: RequestId,
        status: RequestStatus,
        fee: u64,
    },
    RequestTimedOut {
        request_id: RequestId,
    },
    DeliveryFailed {
        request_id: RequestId,
        reason: String,
    },
}
