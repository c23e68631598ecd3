use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application-level structured log entry recorded by the logging service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppLog {
    pub id: Uuid,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Per-offering audit trail row, persisted alongside the entities so admin
/// screens can reconstruct what happened to one offering's money.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineAudit {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
