//! # Settlement Core
//!
//! Application layer of the settlement pipeline:
//!
//! - `webhook/` - gateway callback verification and normalization
//! - `service/` - the payment/booking state machine
//! - `dispatch/` - job enqueueing policy (ids, delays, priorities)
//! - `workers/` - job consumers (commission, wallet)
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service and workers are generic over the repository and queue
//! ports, so adapters are injected at compile time.

pub mod dispatch;
pub mod inbound;
pub mod openapi;
pub mod service;
pub mod webhook;
pub mod workers;

#[cfg(test)]
mod service_tests;

pub use dispatch::{DispatchPolicy, JobDispatcher};
pub use service::{SettlementService, SettlementSettings};
pub use webhook::WebhookVerifier;
pub use workers::{CommissionProcessor, JobRunner, WalletProcessor};
