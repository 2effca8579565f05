//! Request registry — submitted work units and their callback bindings

use crate::error::{RelayError, Result};
use crate::ledger::SessionLedger;
use crate::types::{Request, RequestId, RequestSpec, RequestStatus};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

/// Owned store of requests (request id → request)
#[derive(Debug)]
pub struct RequestRegistry {
    next_id: u64,

    /// Ordered so `pending()` reports oldest first
    requests: BTreeMap<RequestId, Request>,

    /// Submission records (submitter → request ids, in submission order)
    submissions: HashMap<String, Vec<RequestId>>,

    max_payload_bytes: usize,
}

impl RequestRegistry {
    /// Create an empty registry accepting payloads up to `max_payload_bytes`
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            next_id: 1,
            requests: BTreeMap::new(),
            submissions: HashMap::new(),
            max_payload_bytes,
        }
    }

    /// Validate and store a new Pending request
    ///
    /// `escrow_budget` is checked against the fee ceiling only; the
    /// actual charge is computed at settlement.
    pub fn submit(
        &mut self,
        ledger: &SessionLedger,
        spec: RequestSpec,
        caller: &str,
        escrow_budget: u64,
    ) -> Result<RequestId> {
        ledger.authorize_use(&spec.session_id, caller)?;

        if spec.payload.is_empty() {
            return Err(RelayError::Validation(
                "Request payload cannot be empty".to_string(),
            ));
        }
        if spec.payload.len() > self.max_payload_bytes {
            return Err(RelayError::Validation(format!(
                "Request payload is {} bytes, limit is {}",
                spec.payload.len(),
                self.max_payload_bytes
            )));
        }
        if spec.model_ref.trim().is_empty() {
            return Err(RelayError::Validation(
                "Model reference cannot be empty".to_string(),
            ));
        }
        spec.routing_policy.validate()?;
        if escrow_budget < spec.fee_schedule.ceiling {
            return Err(RelayError::InsufficientFunds(format!(
                "Escrow budget {} does not cover fee ceiling {}",
                escrow_budget, spec.fee_schedule.ceiling
            )));
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;

        let request = Request {
            id,
            session_id: spec.session_id,
            model_ref: spec.model_ref,
            routing_policy: spec.routing_policy,
            payload: spec.payload,
            extra_params: spec.extra_params,
            call_type: spec.call_type,
            fee_schedule: spec.fee_schedule,
            callback: spec.callback,
            owner: caller.to_string(),
            status: RequestStatus::Pending,
            submitted_at: Utc::now(),
        };
        self.requests.insert(id, request);
        self.submissions
            .entry(caller.to_string())
            .or_default()
            .push(id);

        Ok(id)
    }

    /// Look up a submitted request
    pub fn get(&self, request_id: RequestId) -> Result<&Request> {
        self.requests
            .get(&request_id)
            .ok_or(RelayError::RequestNotFound(request_id))
    }

    /// Move a Pending request to a terminal status; happens once per request
    pub fn resolve(&mut self, request_id: RequestId, status: RequestStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(RelayError::Validation(
                "Requests can only be resolved to a terminal status".to_string(),
            ));
        }
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(RelayError::RequestNotFound(request_id))?;
        if request.status.is_terminal() {
            return Err(RelayError::AlreadyResolved(request_id));
        }
        request.status = status;
        Ok(())
    }

    /// Request ids submitted by `owner`, oldest first
    pub fn submissions(&self, owner: &str) -> Vec<RequestId> {
        self.submissions.get(owner).cloned().unwrap_or_default()
    }

    /// All requests still awaiting a terminal outcome, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
    }

    /// Number of requests ever submitted
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request was ever submitted
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
