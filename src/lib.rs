//! # a3s-relay
//!
//! Session-escrowed request routing and callback settlement for external
//! inference workers.
//!
//! ## Overview
//!
//! A caller funds a session, submits requests bound to that session, a
//! routing policy, and a callback pair. Workers post responses; the relay
//! decides which responses are authoritative, charges the session, stores
//! the outcome, and fires exactly one callback per resolved request.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_relay::{
//!     CallbackSpec, Dispatcher, FeeSchedule, Outcome, RequestSpec, RequestStatus,
//!     RoutingPolicy, StaticTrustOracle,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_relay::Result<()> {
//! let relay = Dispatcher::new(Arc::new(StaticTrustOracle::new(["node-1"])));
//!
//! let session = relay.open_session("alice", 100).await?;
//! let request = relay
//!     .submit_request(
//!         RequestSpec::new(
//!             session.clone(),
//!             "llama-3-8b",
//!             RoutingPolicy::SystemTrust,
//!             "Summarize the attached report",
//!             FeeSchedule::flat(5),
//!             CallbackSpec::new("reports", "on_summary", "on_summary_failed"),
//!         ),
//!         "alice",
//!         5,
//!     )
//!     .await?;
//!
//! // Later, a worker answers
//! relay
//!     .submit_response(request, Outcome::Success, "", "The report says...", "node-1")
//!     .await?;
//!
//! let outcome = relay.fetch_response(request).await?;
//! assert_eq!(outcome.status, RequestStatus::Success);
//! assert_eq!(relay.close_session(&session, "alice").await?, 95);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **SessionLedger** — prepaid balances and session lifecycle
//! - **RequestRegistry** — submitted requests and their callback bindings
//! - **PolicyEvaluator** — `SystemTrust` / `AnyOf` / `AllOf` routing decisions
//! - **Dispatcher** — settlement, terminal outcomes, callback delivery
//! - **LivenessMonitor** — injects Timeout for requests nobody answered

pub mod callback;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod ledger;
pub mod liveness;
pub mod policy;
pub mod registry;
pub mod types;

// Re-export core types
pub use callback::{CallbackKind, CallbackRegistry, CallbackTarget};
pub use config::RelayConfig;
pub use delivery::{DeliveryFailure, DeliveryLog, MemoryDeliveryLog};
pub use dispatcher::Dispatcher;
pub use error::{ErrorKind, RelayError, Result};
pub use events::{DiscardReason, RelayEvent};
pub use ledger::SessionLedger;
pub use liveness::LivenessMonitor;
pub use policy::{
    ConsensusBuffer, Contribution, PolicyEvaluator, Rejection, StaticTrustOracle, TrustOracle,
    Verdict,
};
pub use registry::RequestRegistry;
pub use types::{
    CallType, CallbackSpec, FeeSchedule, FetchedResponse, NodeId, Outcome, Request, RequestId,
    RequestSpec, RequestStatus, Response, RoutingPolicy, Session, SessionId,
};
