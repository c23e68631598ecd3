use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fees::FeeRate;
use super::influencer::BankAccount;
use super::offering::OfferingRef;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Processing,
    Completed,
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Processing => "processing",
            SettlementStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// The single payout computation for one offering. Amounts and the bank
/// destination are frozen at calculation time; only the lifecycle fields
/// change afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub offering: OfferingRef,
    pub influencer_id: Uuid,
    pub gross_amount: i64,
    pub fee_rate: FeeRate,
    pub fee_amount: i64,
    pub pg_fee_rate: FeeRate,
    pub pg_fee_amount: i64,
    pub net_amount: i64,
    pub status: SettlementStatus,
    pub bank: BankAccount,
    pub calculated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub receipt_url: Option<String>,
    pub notes: Option<String>,
}
