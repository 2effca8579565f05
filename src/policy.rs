//! Routing policy evaluation
//!
//! Decides whether a worker's response is authoritative for a request.
//! `AllOf` policies accumulate contributions per node in a
//! `ConsensusBuffer` owned by the caller; the evaluator itself is stateless
//! apart from the injected `TrustOracle`.

use crate::types::{NodeId, Outcome, RoutingPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// External source of truth for the `SystemTrust` policy
///
/// Staking, reputation, or registry lookups live behind this trait;
/// the relay treats the answer as authoritative.
#[async_trait]
pub trait TrustOracle: Send + Sync {
    /// Whether `node` is currently trusted to answer requests
    async fn is_authorized(&self, node: &NodeId) -> bool;
}

/// Trust oracle backed by a fixed node set
#[derive(Debug, Default, Clone)]
pub struct StaticTrustOracle {
    trusted: HashSet<NodeId>,
}

impl StaticTrustOracle {
    /// Trust exactly `nodes`
    pub fn new<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        Self {
            trusted: nodes.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TrustOracle for StaticTrustOracle {
    async fn is_authorized(&self, node: &NodeId) -> bool {
        self.trusted.contains(node)
    }
}

/// One worker's answer to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub outcome: Outcome,
    pub message: String,
    pub payload: Bytes,
}

impl Contribution {
    /// Build a contribution from a worker's reported outcome
    pub fn new(outcome: Outcome, message: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            outcome,
            message: message.into(),
            payload: payload.into(),
        }
    }

    /// Byte-level agreement; the free-form message is not compared
    fn agrees_with(&self, other: &Contribution) -> bool {
        self.outcome == other.outcome && self.payload == other.payload
    }
}

/// Per-request contributions from `AllOf` nodes, keyed by node
pub type ConsensusBuffer = BTreeMap<NodeId, Contribution>;

/// Why a contribution was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Responder is not authoritative under the policy
    Unauthorized,
    /// Every `AllOf` node answered, but not identically
    ConsensusMismatch,
}

/// Result of evaluating a response against a routing policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Contribution is authoritative; settle with it
    Accept(Contribution),
    /// Contribution buffered; other nodes still have to answer
    AwaitMore { received: usize, required: usize },
    Reject(Rejection),
}

/// Applies routing policies, consulting the trust oracle for `SystemTrust`
#[derive(Clone)]
pub struct PolicyEvaluator {
    oracle: Arc<dyn TrustOracle>,
}

impl PolicyEvaluator {
    /// Create an evaluator backed by `oracle`
    pub fn new(oracle: Arc<dyn TrustOracle>) -> Self {
        Self { oracle }
    }

    /// Whether `node` may answer requests routed by `policy`
    ///
    /// Only `SystemTrust` reaches the oracle. Must not be awaited while the
    /// dispatcher state is locked.
    pub async fn authorize(&self, policy: &RoutingPolicy, node: &NodeId) -> bool {
        match policy {
            RoutingPolicy::SystemTrust => self.oracle.is_authorized(node).await,
            RoutingPolicy::AnyOf { nodes } | RoutingPolicy::AllOf { nodes } => {
                nodes.contains(node)
            }
        }
    }

    /// Evaluate `contribution` from `node`, given the outcome of `authorize`
    ///
    /// For `AllOf`, `prior` is updated in place: a node's resubmission
    /// replaces its own earlier contribution.
    pub fn evaluate(
        &self,
        policy: &RoutingPolicy,
        node: &NodeId,
        authorized: bool,
        contribution: Contribution,
        prior: &mut ConsensusBuffer,
    ) -> Verdict {
        if !authorized {
            return Verdict::Reject(Rejection::Unauthorized);
        }
        let RoutingPolicy::AllOf { nodes } = policy else {
            return Verdict::Accept(contribution);
        };
        if !nodes.contains(node) {
            return Verdict::Reject(Rejection::Unauthorized);
        }
        prior.insert(node.clone(), contribution);

        let received = nodes.iter().filter(|n| prior.contains_key(*n)).count();
        if received < nodes.len() {
            return Verdict::AwaitMore {
                received,
                required: nodes.len(),
            };
        }

        let mut answers = nodes.iter().filter_map(|n| prior.get(n));
        let Some(first) = answers.next() else {
            return Verdict::Reject(Rejection::Unauthorized);
        };
        if answers.all(|c| c.agrees_with(first)) {
            Verdict::Accept(first.clone())
        } else {
            Verdict::Reject(Rejection::ConsensusMismatch)
        }
    }
}
