//! Core protocol types for a3s-relay
//!
//! All types use camelCase JSON serialization for wire compatibility.

use crate::error::{RelayError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Session identifier (ses-<uuid>)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh, globally unique session id
    pub fn generate() -> Self {
        Self(format!("ses-{}", uuid::Uuid::new_v4()))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request identifier, assigned monotonically by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Stable identity of an external worker node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a worker node identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prepaid billing context owned by one identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,

    /// Identity that opened (and alone may close) the session
    pub owner: String,

    /// Remaining prepaid balance
    pub balance: u64,

    /// Amount the session was funded with at open
    pub opened_with: u64,

    /// False once closed; closed sessions are kept for lookup
    pub active: bool,

    /// Identities the owner allowed to submit requests against this session
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub delegates: BTreeSet<String>,

    pub opened_at: DateTime<Utc>,
}

impl Session {
    /// Whether `caller` may bill requests to this session
    pub fn is_usable_by(&self, caller: &str) -> bool {
        self.owner == caller || self.delegates.contains(caller)
    }
}

/// Which responders are authoritative for a request's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RoutingPolicy {
    /// Authorization delegated to the external trust oracle
    SystemTrust,
    /// First accepted response from any listed node wins
    AnyOf { nodes: BTreeSet<NodeId> },
    /// Every listed node must return a byte-identical response
    AllOf { nodes: BTreeSet<NodeId> },
}

impl RoutingPolicy {
    /// `AnyOf` over the given nodes
    pub fn any_of<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        RoutingPolicy::AnyOf {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// `AllOf` over the given nodes
    pub fn all_of<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        RoutingPolicy::AllOf {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Reject explicit policies with no nodes; they could never resolve
    pub fn validate(&self) -> Result<()> {
        match self {
            RoutingPolicy::SystemTrust => Ok(()),
            RoutingPolicy::AnyOf { nodes } | RoutingPolicy::AllOf { nodes } => {
                if nodes.is_empty() {
                    Err(RelayError::Validation(
                        "Routing policy node set cannot be empty".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Handler pair and the component that hosts them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackSpec {
    pub success_handler: String,
    pub failure_handler: String,
    /// Component id the handlers are registered under
    pub target: String,
}

impl CallbackSpec {
    /// Address `target`'s success and failure handlers
    pub fn new(
        target: impl Into<String>,
        success_handler: impl Into<String>,
        failure_handler: impl Into<String>,
    ) -> Self {
        Self {
            success_handler: success_handler.into(),
            failure_handler: failure_handler.into(),
            target: target.into(),
        }
    }
}

/// How the request payload is to be interpreted by workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    /// Payload carries the data itself
    #[default]
    Inline,
    /// Payload is an opaque content-addressed reference; never dereferenced here
    ExternalRef,
}

/// Response pricing, capped at `ceiling`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    #[serde(default)]
    pub base_fee: u64,
    #[serde(default)]
    pub per_byte_fee: u64,
    pub ceiling: u64,
}

impl FeeSchedule {
    /// A fixed fee regardless of response size
    pub fn flat(amount: u64) -> Self {
        Self {
            base_fee: amount,
            per_byte_fee: 0,
            ceiling: amount,
        }
    }

    /// Fee for a response of `payload_len` bytes
    pub fn fee_for(&self, payload_len: usize) -> u64 {
        let variable = self.per_byte_fee.saturating_mul(payload_len as u64);
        self.base_fee.saturating_add(variable).min(self.ceiling)
    }
}

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Success,
    Failure,
    Timeout,
}

impl RequestStatus {
    /// Whether the status can no longer change
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Success => write!(f, "success"),
            RequestStatus::Failure => write!(f, "failure"),
            RequestStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Status a worker reports with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl From<Outcome> for RequestStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => RequestStatus::Success,
            Outcome::Failure => RequestStatus::Failure,
        }
    }
}

/// Caller-supplied parameters of a request submission
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub session_id: SessionId,
    pub model_ref: String,
    pub routing_policy: RoutingPolicy,
    pub payload: Bytes,
    pub extra_params: Bytes,
    pub call_type: CallType,
    pub fee_schedule: FeeSchedule,
    pub callback: CallbackSpec,
}

impl RequestSpec {
    /// Inline request with no extra params
    pub fn new(
        session_id: SessionId,
        model_ref: impl Into<String>,
        routing_policy: RoutingPolicy,
        payload: impl Into<Bytes>,
        fee_schedule: FeeSchedule,
        callback: CallbackSpec,
    ) -> Self {
        Self {
            session_id,
            model_ref: model_ref.into(),
            routing_policy,
            payload: payload.into(),
            extra_params: Bytes::new(),
            call_type: CallType::Inline,
            fee_schedule,
            callback,
        }
    }

    /// Attach opaque extra parameters
    pub fn with_extra_params(mut self, extra_params: impl Into<Bytes>) -> Self {
        self.extra_params = extra_params.into();
        self
    }

    /// Override the call type
    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }
}

/// A submitted unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub session_id: SessionId,
    pub model_ref: String,
    pub routing_policy: RoutingPolicy,
    pub payload: Bytes,
    pub extra_params: Bytes,
    pub call_type: CallType,
    pub fee_schedule: FeeSchedule,
    pub callback: CallbackSpec,
    /// Identity that submitted the request
    pub owner: String,
    pub status: RequestStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Terminal outcome stored when a request leaves Pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub message: String,
    pub payload: Bytes,
    /// Worker whose contribution resolved the request (None on timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub timestamp: DateTime<Utc>,
    /// Amount charged to the session at settlement
    pub fee: u64,
}

/// Read-only view returned by `fetch_response`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: RequestStatus,
    pub message: String,
    pub payload: Bytes,
}

impl FetchedResponse {
    pub(crate) fn pending() -> Self {
        Self {
            status: RequestStatus::Pending,
            message: String::new(),
            payload: Bytes::new(),
        }
    }
}

impl From<&Response> for FetchedResponse {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status,
            message: response.message.clone(),
            payload: response.payload.clone(),
        }
    }
}
