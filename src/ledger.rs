//! Session ledger — prepaid balances and session lifecycle
//!
//! The ledger is a plain owned store. Callers serialize access to it
//! (the `Dispatcher` keeps it behind its state lock), so every operation
//! here either applies completely or returns an error with no change.

use crate::error::{RelayError, Result};
use crate::types::{Session, SessionId};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

/// Owned store of sessions (session id → session)
#[derive(Debug, Default)]
pub struct SessionLedger {
    sessions: HashMap<SessionId, Session>,
}

impl SessionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a funded session and return its id
    ///
    /// The transfer of `amount` is assumed to have happened already;
    /// the ledger only records the declared funding.
    pub fn open(&mut self, owner: &str, amount: u64) -> Result<SessionId> {
        if amount == 0 {
            return Err(RelayError::InsufficientFunds(
                "Session must be opened with a positive amount".to_string(),
            ));
        }
        if owner.is_empty() {
            return Err(RelayError::Validation(
                "Session owner cannot be empty".to_string(),
            ));
        }

        let id = SessionId::generate();
        let session = Session {
            id: id.clone(),
            owner: owner.to_string(),
            balance: amount,
            opened_with: amount,
            active: true,
            delegates: BTreeSet::new(),
            opened_at: Utc::now(),
        };
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    /// Debit `amount` from an active session
    pub fn charge(&mut self, session_id: &SessionId, amount: u64) -> Result<u64> {
        let session = self.get_mut(session_id)?;
        if !session.active {
            return Err(RelayError::SessionInactive(session_id.clone()));
        }
        if session.balance < amount {
            return Err(RelayError::InsufficientBalance {
                session_id: session_id.clone(),
                required: amount,
                available: session.balance,
            });
        }
        session.balance -= amount;
        Ok(session.balance)
    }

    /// Close a session, returning the residual balance to refund to the owner
    pub fn close(&mut self, session_id: &SessionId, caller: &str) -> Result<u64> {
        let session = self.get_mut(session_id)?;
        if session.owner != caller {
            return Err(RelayError::NotOwner {
                session_id: session_id.clone(),
                caller: caller.to_string(),
            });
        }
        if !session.active {
            return Err(RelayError::AlreadyClosed(session_id.clone()));
        }
        let residual = session.balance;
        session.balance = 0;
        session.active = false;
        Ok(residual)
    }

    /// Allow `delegate` to submit requests billed to the session
    pub fn grant(&mut self, session_id: &SessionId, caller: &str, delegate: &str) -> Result<()> {
        if delegate.is_empty() {
            return Err(RelayError::Validation(
                "Delegate identity cannot be empty".to_string(),
            ));
        }
        let session = self.owned_active_mut(session_id, caller)?;
        session.delegates.insert(delegate.to_string());
        Ok(())
    }

    /// Withdraw a delegate's access; returns whether it was present
    pub fn revoke(&mut self, session_id: &SessionId, caller: &str, delegate: &str) -> Result<bool> {
        let session = self.owned_active_mut(session_id, caller)?;
        Ok(session.delegates.remove(delegate))
    }

    /// Look up a session, open or closed
    pub fn get(&self, session_id: &SessionId) -> Result<&Session> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.clone()))
    }

    /// Check that `caller` may bill new work to an active session
    pub fn authorize_use(&self, session_id: &SessionId, caller: &str) -> Result<&Session> {
        let session = self.get(session_id)?;
        if !session.active {
            return Err(RelayError::SessionInactive(session_id.clone()));
        }
        if !session.is_usable_by(caller) {
            return Err(RelayError::NotOwner {
                session_id: session_id.clone(),
                caller: caller.to_string(),
            });
        }
        Ok(session)
    }

    /// Number of sessions ever opened
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session was ever opened
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn get_mut(&mut self, session_id: &SessionId) -> Result<&mut Session> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.clone()))
    }

    fn owned_active_mut(&mut self, session_id: &SessionId, caller: &str) -> Result<&mut Session> {
        let session = self.get_mut(session_id)?;
        if session.owner != caller {
            return Err(RelayError::NotOwner {
                session_id: session_id.clone(),
                caller: caller.to_string(),
            });
        }
        if !session.active {
            return Err(RelayError::SessionInactive(session_id.clone()));
        }
        Ok(session)
    }
}
