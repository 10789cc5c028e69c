//! Rate-budgeted language-model client for the Hamlet conversation engine.
//!
//! The oracle is treated as a black box with latency, a rate budget and a
//! small set of failure modes. Everything here is safe to call from any
//! worker task concurrently.
//!
//! ```text
//! caller --> OracleClient::send --> RateBudget --> TextOracle backend
//!                 |  backoff / timeout / one transient retry  |
//!                 <-------------- text or OracleError ---------
//! ```
//!
//! # Modules
//!
//! - [`backend`] -- The [`TextOracle`] capability and HTTP backends
//! - [`budget`] -- Rolling request/token window ([`RateBudget`])
//! - [`client`] -- Admission, deadline and retry wrapper ([`OracleClient`])
//! - [`config`] -- Environment configuration ([`OracleConfig`])
//! - [`error`] -- Failure kinds ([`OracleError`])
//! - [`parse`] -- JSON recovery from free-form replies

pub mod backend;
pub mod budget;
pub mod client;
pub mod config;
pub mod error;
pub mod parse;

pub use backend::{Generation, SharedOracle, TextOracle, create_backend};
pub use budget::{Admission, BudgetUsage, RateBudget, Reservation};
pub use client::{CancelFlag, OracleClient, OracleReply, OracleRequest};
pub use config::{BackendConfig, BackendType, BudgetConfig, OracleConfig, RetryPolicy};
pub use error::OracleError;
pub use parse::parse_json;
