use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-(offering, participant) prepaid balance for in-trip shared costs.
/// `balance` is a cached projection of the transaction log; the two must
/// never drift.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExpenseWallet {
    pub offering_id: Uuid,
    pub participant_id: Uuid,
    pub balance: i64,
    pub total_charged: i64,
    pub total_used: i64,
    /// Outstanding top-up amount requested by the influencer. Informational,
    /// moves no money.
    pub requested_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseWallet {
    pub fn new(offering_id: Uuid, participant_id: Uuid, now: DateTime<Utc>) -> Self {
        ExpenseWallet {
            offering_id,
            participant_id,
            balance: 0,
            total_charged: 0,
            total_used: 0,
            requested_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Conservation invariant: balance equals lifetime charges minus
    /// lifetime deductions and is never negative.
    pub fn is_consistent(&self) -> bool {
        self.balance == self.total_charged - self.total_used && self.balance >= 0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WalletTxKind {
    Charge,
    Deduct,
}

/// Append-only ledger record. Never updated or deleted; replaying these must
/// reproduce the wallet's cached balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub participant_id: Uuid,
    pub kind: WalletTxKind,
    pub amount: i64,
    pub balance_after: i64,
    /// Set when the deduction was collected for a split-bill allocation.
    pub allocation_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            WalletTxKind::Charge => self.amount,
            WalletTxKind::Deduct => -self.amount,
        }
    }
}
