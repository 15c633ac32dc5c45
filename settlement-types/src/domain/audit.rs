//! Append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One immutable audit record: a state transition or job outcome, keyed by
/// the aggregate it touched. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// Payment, booking, or wallet id the entry belongs to.
    pub aggregate_id: String,
    /// Dotted action name, e.g. `payment.completed`, `commission.settled`.
    pub action: String,
    pub previous: Option<serde_json::Value>,
    pub next: Option<serde_json::Value>,
    /// Who caused the transition: `gateway:<name>`, `worker`, `admin`, `kyc`.
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn record(
        aggregate_id: impl Into<String>,
        action: impl Into<String>,
        previous: Option<serde_json::Value>,
        next: Option<serde_json::Value>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            action: action.into(),
            previous,
            next,
            actor: actor.into(),
            recorded_at: Utc::now(),
        }
    }
}
