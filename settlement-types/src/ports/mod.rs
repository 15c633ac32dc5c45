//! Port traits implemented by adapters.

pub mod collaborators;
pub mod queue;
pub mod repository;

pub use collaborators::{KycGate, Notifier, RefundGateway};
pub use queue::{EnqueueOptions, JobQueue};
pub use repository::SettlementRepository;
