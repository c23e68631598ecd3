use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fees::FeeRate;
use super::offering::OfferingType;

/// Payout destination. Snapshotted onto a settlement at calculation time so
/// later edits never alter an existing settlement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankAccount {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Influencer {
    pub id: Uuid,
    pub name: String,
    pub bank: BankAccount,
    /// Negotiated overrides. `Some(rate)` always wins over the platform
    /// default, including a legitimate 0% rate.
    pub course_fee_override: Option<FeeRate>,
    pub party_fee_override: Option<FeeRate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Influencer {
    pub fn fee_override(&self, offering_type: OfferingType) -> Option<FeeRate> {
        match offering_type {
            OfferingType::Course => self.course_fee_override,
            OfferingType::Party => self.party_fee_override,
        }
    }
}
