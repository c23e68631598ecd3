use crate::core::errors::EngineError;
use crate::core::models::{
    allocation::{CollectionOutcome, SplitBill},
    audit::EngineAudit,
    fees::FeeConfig,
    influencer::Influencer,
    offering::{Offering, OfferingRef},
    participation::Participation,
    settlement::{Settlement, SettlementStatus},
    wallet::{ExpenseWallet, WalletTransaction},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence seam for the engine. Wallet mutations, split-bill collection,
/// the settlement insert and the settlement transitions are check-then-commit
/// sections: implementations serialize each of them (row locks and
/// conditional updates in a database, a table lock in memory).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save_influencer(&self, influencer: Influencer) -> Result<(), EngineError>;
    async fn get_influencer(&self, influencer_id: Uuid) -> Result<Option<Influencer>, EngineError>;

    async fn save_offering(&self, offering: Offering) -> Result<(), EngineError>;
    async fn get_offering(&self, reference: &OfferingRef) -> Result<Option<Offering>, EngineError>;

    async fn save_participation(&self, participation: Participation) -> Result<(), EngineError>;
    async fn get_participation(
        &self,
        participation_id: Uuid,
    ) -> Result<Option<Participation>, EngineError>;
    async fn get_participations_by_offering(
        &self,
        offering_id: Uuid,
    ) -> Result<Vec<Participation>, EngineError>;

    async fn get_wallet(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<ExpenseWallet>, EngineError>;
    /// Credits the wallet (creating it lazily) and appends the charge
    /// transaction, atomically.
    async fn apply_charge(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError>;
    /// Debits the wallet if the balance covers it, appending the deduct
    /// transaction; the sufficiency check and the write happen under one
    /// lock so concurrent deductions never pass against a stale balance.
    async fn apply_deduct(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        allocation_id: Option<Uuid>,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError>;
    /// All-or-nothing share collection for a stored split bill: either every
    /// listed wallet is deducted `per_person_amount` in one pass and the
    /// allocation flips to completed, or none is and the full shortfall list
    /// is returned with the allocation left pending. The pending guard, the
    /// deductions and the status flip form one atomic section, so two racing
    /// collection passes can never both deduct; the loser gets
    /// `AllocationAlreadyCompleted`.
    async fn collect_for_allocation(
        &self,
        allocation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(SplitBill, CollectionOutcome), EngineError>;
    async fn set_requested_amount(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<ExpenseWallet, EngineError>;
    async fn get_wallet_transactions(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, EngineError>;

    async fn save_allocation(&self, allocation: SplitBill) -> Result<(), EngineError>;
    async fn get_allocation(&self, allocation_id: Uuid) -> Result<Option<SplitBill>, EngineError>;
    async fn get_allocations_by_offering(
        &self,
        offering_id: Uuid,
    ) -> Result<Vec<SplitBill>, EngineError>;

    /// Fails with `AlreadyCalculated` when a settlement for the same
    /// offering reference exists; the check and the insert are one atomic
    /// step so racing calculations produce exactly one row.
    async fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement, EngineError>;
    async fn get_settlement(&self, settlement_id: Uuid) -> Result<Option<Settlement>, EngineError>;
    async fn get_settlement_by_offering(
        &self,
        reference: &OfferingRef,
    ) -> Result<Option<Settlement>, EngineError>;
    /// Compare-and-set write: applies only while the stored status still
    /// equals `expected`, so racing lifecycle calls resolve to exactly one
    /// winner and the loser gets `InvalidState` with the status it lost to.
    async fn update_settlement(
        &self,
        settlement: Settlement,
        expected: SettlementStatus,
    ) -> Result<Settlement, EngineError>;

    async fn set_fee_config(&self, config: FeeConfig) -> Result<(), EngineError>;
    async fn get_fee_config(&self) -> Result<Option<FeeConfig>, EngineError>;

    async fn save_engine_audit(&self, audit: EngineAudit) -> Result<(), EngineError>;
    async fn get_engine_audits(&self, offering_id: Uuid) -> Result<Vec<EngineAudit>, EngineError>;
}

pub mod in_memory;
