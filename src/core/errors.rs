use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::models::SettlementStatus;

#[derive(Error, Debug, Serialize)]
pub enum EngineError {
    /// A deduction was attempted against a wallet that cannot cover it.
    /// A missing wallet reports `available: 0`.
    #[error("Insufficient balance for participant {participant_id}: required {required}, available {available}")]
    InsufficientBalance {
        participant_id: Uuid,
        required: i64,
        available: i64,
    },

    /// A settlement already exists for this offering; the math runs once.
    #[error("Settlement already calculated for offering {0}")]
    AlreadyCalculated(String),

    /// No confirmed, paid participations to aggregate.
    #[error("Nothing to settle for offering {0}")]
    NothingToSettle(String),

    /// Lifecycle transition attempted from a state that does not permit it.
    #[error("Settlement {settlement_id} is {current}; transition not allowed")]
    InvalidState {
        settlement_id: Uuid,
        current: SettlementStatus,
    },

    #[error("Offering {0} not found")]
    OfferingNotFound(String),

    #[error("Influencer {0} not found")]
    InfluencerNotFound(String),

    #[error("Participation {0} not found")]
    ParticipationNotFound(String),

    /// Split-bill participant that is not a confirmed member of the offering.
    #[error("Participant {0} is not a confirmed participant of this offering")]
    NotConfirmedParticipant(String),

    #[error("Participant {0} listed more than once")]
    DuplicateParticipant(String),

    #[error("Participant list cannot be empty")]
    EmptyParticipants,

    #[error("Allocation {0} not found")]
    AllocationNotFound(String),

    #[error("Allocation {0} already completed")]
    AllocationAlreadyCompleted(String),

    #[error("Settlement {0} not found")]
    SettlementNotFound(String),

    #[error("Participation {0} already cancelled")]
    AlreadyCancelled(String),

    #[error("Invalid amount for `{0}`: {1}")]
    InvalidAmount(String, i64),

    /// Generic input validation error
    #[error("Invalid input for field `{field}`: {description}")]
    InvalidInput { field: String, description: String },

    /// Fatal: the ledger's conservation invariant was broken. Indicates a
    /// bug, never user error; the enclosing mutation must not commit.
    #[error("Ledger invariant violated: {0}")]
    LedgerInvariantViolation(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Logging error: {0}")]
    LoggingError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}
