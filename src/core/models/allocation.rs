use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wallet::WalletTransaction;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Pending,
    Completed,
}

/// One equal-share cost split (N-bang) over a fixed set of confirmed
/// participants. `per_person_amount` is fixed at creation and never
/// recomputed, even when collection is retried later.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitBill {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub title: String,
    pub total_amount: i64,
    pub per_person_amount: i64,
    pub participant_ids: Vec<Uuid>,
    /// Display hint only; does not change ledger math.
    pub include_fee_in_amount: bool,
    pub status: AllocationStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SplitBill {
    /// Ceiling rounding over-collects by up to n-1 units; the surplus stays
    /// with the platform.
    pub fn rounding_surplus(&self) -> i64 {
        self.per_person_amount * self.participant_ids.len() as i64 - self.total_amount
    }
}

/// Outcome of one atomic collection pass over every participant wallet.
#[derive(Clone, Debug)]
pub enum CollectionOutcome {
    /// Every wallet covered its share; one deduct transaction per participant.
    Collected(Vec<WalletTransaction>),
    /// At least one wallet fell short; nothing was deducted from anyone.
    Insufficient(Vec<Uuid>),
}
