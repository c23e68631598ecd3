use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::offering::OfferingRef;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipationStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

/// One participant's slot in an offering. Only confirmed participations with
/// a recorded paid amount count toward settlement revenue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participation {
    pub id: Uuid,
    pub offering: OfferingRef,
    pub participant_id: Uuid,
    pub status: ParticipationStatus,
    pub paid_amount: Option<i64>,
    pub applied_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Participation {
    pub fn is_confirmed(&self) -> bool {
        self.status == ParticipationStatus::Confirmed
    }

    pub fn settleable_amount(&self) -> Option<i64> {
        if self.is_confirmed() { self.paid_amount } else { None }
    }
}
