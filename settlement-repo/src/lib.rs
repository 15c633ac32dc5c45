//! # Settlement Repository
//!
//! Concrete adapters for the settlement pipeline's ports:
//!
//! - `memory` - in-memory repository and job queue (tests, local dev)
//! - `postgres` - PostgreSQL repository and job queue (feature `postgres`)
//! - `collaborators` - HTTP KYC gate and refund gateway, plus static dev
//!   fallbacks and the tracing-backed notifier

pub mod collaborators;
pub mod memory;
pub mod queue;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
mod types;

pub use memory::InMemoryRepo;
pub use queue::InMemoryJobQueue;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresJobQueue, PostgresRepo};

/// Connects to Postgres, runs migrations, and returns the repository and
/// job queue sharing one pool.
#[cfg(feature = "postgres")]
pub async fn build_postgres(database_url: &str) -> anyhow::Result<(PostgresRepo, PostgresJobQueue)> {
    let repo = PostgresRepo::new(database_url).await?;
    let queue = PostgresJobQueue::new(repo.pool().clone());
    Ok((repo, queue))
}
