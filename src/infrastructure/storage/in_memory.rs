use crate::core::errors::EngineError;
use crate::core::models::{
    allocation::{AllocationStatus, CollectionOutcome, SplitBill},
    audit::EngineAudit,
    fees::FeeConfig,
    influencer::Influencer,
    offering::{Offering, OfferingRef},
    participation::Participation,
    settlement::{Settlement, SettlementStatus},
    wallet::{ExpenseWallet, WalletTransaction, WalletTxKind},
};
use crate::infrastructure::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A wallet together with its append-only transaction log, kept in one slot
/// so a single lock covers both the balance and the history.
struct WalletAccount {
    wallet: ExpenseWallet,
    transactions: Vec<WalletTransaction>,
}

pub struct InMemoryStorage {
    influencers: Mutex<HashMap<Uuid, Influencer>>,
    offerings: Mutex<HashMap<Uuid, Offering>>,
    participations: Mutex<HashMap<Uuid, Participation>>,
    // One lock over every wallet: deductions and split collections run their
    // check-then-commit inside a single critical section.
    wallets: Mutex<HashMap<(Uuid, Uuid), WalletAccount>>,
    allocations: Mutex<HashMap<Uuid, SplitBill>>,
    settlements: Mutex<HashMap<String, Settlement>>, // keyed by OfferingRef::key()
    fee_config: Mutex<Option<FeeConfig>>,
    engine_audits: Mutex<HashMap<Uuid, Vec<EngineAudit>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            influencers: Mutex::new(HashMap::new()),
            offerings: Mutex::new(HashMap::new()),
            participations: Mutex::new(HashMap::new()),
            wallets: Mutex::new(HashMap::new()),
            allocations: Mutex::new(HashMap::new()),
            settlements: Mutex::new(HashMap::new()),
            fee_config: Mutex::new(None),
            engine_audits: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the post-mutation wallet and its ledger record without
    /// committing anything, and verifies the conservation invariant on the
    /// staged state. A violation here is a bug, not a business condition.
    fn stage_mutation(
        previous: &ExpenseWallet,
        kind: WalletTxKind,
        amount: i64,
        allocation_id: Option<Uuid>,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError> {
        let mut next = previous.clone();
        match kind {
            WalletTxKind::Charge => {
                next.balance += amount;
                next.total_charged += amount;
            }
            WalletTxKind::Deduct => {
                next.balance -= amount;
                next.total_used += amount;
            }
        }
        next.updated_at = now;

        let tx = WalletTransaction {
            id: Uuid::new_v4(),
            offering_id: previous.offering_id,
            participant_id: previous.participant_id,
            kind,
            amount,
            balance_after: next.balance,
            allocation_id,
            description,
            created_at: now,
        };

        if !next.is_consistent() || next.balance - previous.balance != tx.signed_amount() {
            return Err(EngineError::LedgerInvariantViolation(format!(
                "wallet ({}, {}): balance {} -> {}, charged {}, used {}, tx {:?} {}",
                previous.offering_id,
                previous.participant_id,
                previous.balance,
                next.balance,
                next.total_charged,
                next.total_used,
                kind,
                amount,
            )));
        }

        Ok((next, tx))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save_influencer(&self, influencer: Influencer) -> Result<(), EngineError> {
        self.influencers
            .lock()
            .await
            .insert(influencer.id, influencer);
        Ok(())
    }

    async fn get_influencer(&self, influencer_id: Uuid) -> Result<Option<Influencer>, EngineError> {
        Ok(self.influencers.lock().await.get(&influencer_id).cloned())
    }

    async fn save_offering(&self, offering: Offering) -> Result<(), EngineError> {
        self.offerings.lock().await.insert(offering.id, offering);
        Ok(())
    }

    async fn get_offering(&self, reference: &OfferingRef) -> Result<Option<Offering>, EngineError> {
        Ok(self
            .offerings
            .lock()
            .await
            .get(&reference.offering_id)
            .filter(|o| o.offering_type == reference.offering_type)
            .cloned())
    }

    async fn save_participation(&self, participation: Participation) -> Result<(), EngineError> {
        self.participations
            .lock()
            .await
            .insert(participation.id, participation);
        Ok(())
    }

    async fn get_participation(
        &self,
        participation_id: Uuid,
    ) -> Result<Option<Participation>, EngineError> {
        Ok(self
            .participations
            .lock()
            .await
            .get(&participation_id)
            .cloned())
    }

    async fn get_participations_by_offering(
        &self,
        offering_id: Uuid,
    ) -> Result<Vec<Participation>, EngineError> {
        // For production: database query with an index on offering_id
        Ok(self
            .participations
            .lock()
            .await
            .values()
            .filter(|p| p.offering.offering_id == offering_id)
            .cloned()
            .collect())
    }

    async fn get_wallet(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<ExpenseWallet>, EngineError> {
        Ok(self
            .wallets
            .lock()
            .await
            .get(&(offering_id, participant_id))
            .map(|account| account.wallet.clone()))
    }

    async fn apply_charge(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError> {
        let mut wallets = self.wallets.lock().await;
        let key = (offering_id, participant_id);
        let previous = match wallets.get(&key) {
            Some(account) => account.wallet.clone(),
            None => ExpenseWallet::new(offering_id, participant_id, now),
        };

        let (next, tx) = Self::stage_mutation(
            &previous,
            WalletTxKind::Charge,
            amount,
            None,
            description,
            now,
        )?;

        let account = wallets.entry(key).or_insert_with(|| WalletAccount {
            wallet: previous,
            transactions: Vec::new(),
        });
        account.wallet = next;
        account.transactions.push(tx.clone());
        Ok((account.wallet.clone(), tx))
    }

    async fn apply_deduct(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        allocation_id: Option<Uuid>,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError> {
        let mut wallets = self.wallets.lock().await;
        let key = (offering_id, participant_id);
        // A missing wallet is an empty wallet as far as deductions go.
        let Some(account) = wallets.get_mut(&key) else {
            return Err(EngineError::InsufficientBalance {
                participant_id,
                required: amount,
                available: 0,
            });
        };
        if account.wallet.balance < amount {
            return Err(EngineError::InsufficientBalance {
                participant_id,
                required: amount,
                available: account.wallet.balance,
            });
        }

        let (next, tx) = Self::stage_mutation(
            &account.wallet,
            WalletTxKind::Deduct,
            amount,
            allocation_id,
            description,
            now,
        )?;
        account.wallet = next;
        account.transactions.push(tx.clone());
        Ok((account.wallet.clone(), tx))
    }

    async fn collect_for_allocation(
        &self,
        allocation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(SplitBill, CollectionOutcome), EngineError> {
        // The allocation lock is held across the pending guard, the wallet
        // deductions and the status flip: two racing collection passes
        // serialize here, and the second one finds the bill completed.
        let mut allocations = self.allocations.lock().await;
        let allocation = allocations
            .get_mut(&allocation_id)
            .ok_or_else(|| EngineError::AllocationNotFound(allocation_id.to_string()))?;
        if allocation.status == AllocationStatus::Completed {
            return Err(EngineError::AllocationAlreadyCompleted(
                allocation_id.to_string(),
            ));
        }
        let mut wallets = self.wallets.lock().await;

        let offering_id = allocation.offering_id;
        let per_person_amount = allocation.per_person_amount;
        let shortfall: Vec<Uuid> = allocation
            .participant_ids
            .iter()
            .filter(|&&pid| {
                let balance = wallets
                    .get(&(offering_id, pid))
                    .map(|a| a.wallet.balance)
                    .unwrap_or(0);
                balance < per_person_amount
            })
            .copied()
            .collect();
        if !shortfall.is_empty() {
            return Ok((allocation.clone(), CollectionOutcome::Insufficient(shortfall)));
        }

        // Stage every mutation first; commit only when all of them verify.
        let mut staged = Vec::with_capacity(allocation.participant_ids.len());
        for &pid in &allocation.participant_ids {
            let account = wallets.get(&(offering_id, pid)).ok_or_else(|| {
                EngineError::LedgerInvariantViolation(format!(
                    "wallet ({}, {}) vanished during collection",
                    offering_id, pid
                ))
            })?;
            let (next, tx) = Self::stage_mutation(
                &account.wallet,
                WalletTxKind::Deduct,
                per_person_amount,
                Some(allocation_id),
                allocation.title.clone(),
                now,
            )?;
            staged.push((pid, next, tx));
        }

        let mut transactions = Vec::with_capacity(staged.len());
        for (pid, next, tx) in staged {
            if let Some(account) = wallets.get_mut(&(offering_id, pid)) {
                account.wallet = next;
                account.transactions.push(tx.clone());
                transactions.push(tx);
            }
        }
        allocation.status = AllocationStatus::Completed;
        allocation.completed_at = Some(now);
        Ok((allocation.clone(), CollectionOutcome::Collected(transactions)))
    }

    async fn set_requested_amount(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<ExpenseWallet, EngineError> {
        let mut wallets = self.wallets.lock().await;
        let account = wallets
            .entry((offering_id, participant_id))
            .or_insert_with(|| WalletAccount {
                wallet: ExpenseWallet::new(offering_id, participant_id, now),
                transactions: Vec::new(),
            });
        account.wallet.requested_amount = amount;
        account.wallet.updated_at = now;
        Ok(account.wallet.clone())
    }

    async fn get_wallet_transactions(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, EngineError> {
        Ok(self
            .wallets
            .lock()
            .await
            .get(&(offering_id, participant_id))
            .map(|account| account.transactions.clone())
            .unwrap_or_default())
    }

    async fn save_allocation(&self, allocation: SplitBill) -> Result<(), EngineError> {
        self.allocations
            .lock()
            .await
            .insert(allocation.id, allocation);
        Ok(())
    }

    async fn get_allocation(&self, allocation_id: Uuid) -> Result<Option<SplitBill>, EngineError> {
        Ok(self.allocations.lock().await.get(&allocation_id).cloned())
    }

    async fn get_allocations_by_offering(
        &self,
        offering_id: Uuid,
    ) -> Result<Vec<SplitBill>, EngineError> {
        Ok(self
            .allocations
            .lock()
            .await
            .values()
            .filter(|a| a.offering_id == offering_id)
            .cloned()
            .collect())
    }

    async fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement, EngineError> {
        // Insert-if-absent under the settlements lock: of two racing
        // calculations, exactly one lands here first and wins.
        let mut settlements = self.settlements.lock().await;
        let key = settlement.offering.key();
        if settlements.contains_key(&key) {
            return Err(EngineError::AlreadyCalculated(key));
        }
        settlements.insert(key, settlement.clone());
        Ok(settlement)
    }

    async fn get_settlement(&self, settlement_id: Uuid) -> Result<Option<Settlement>, EngineError> {
        Ok(self
            .settlements
            .lock()
            .await
            .values()
            .find(|s| s.id == settlement_id)
            .cloned())
    }

    async fn get_settlement_by_offering(
        &self,
        reference: &OfferingRef,
    ) -> Result<Option<Settlement>, EngineError> {
        Ok(self.settlements.lock().await.get(&reference.key()).cloned())
    }

    async fn update_settlement(
        &self,
        settlement: Settlement,
        expected: SettlementStatus,
    ) -> Result<Settlement, EngineError> {
        // Compare-and-set under the settlements lock: a racing transition
        // that already moved the status on makes this write fail instead of
        // silently overwriting it.
        let mut settlements = self.settlements.lock().await;
        let key = settlement.offering.key();
        match settlements.get(&key) {
            Some(existing) if existing.id == settlement.id => {
                if existing.status != expected {
                    return Err(EngineError::InvalidState {
                        settlement_id: settlement.id,
                        current: existing.status,
                    });
                }
                settlements.insert(key, settlement.clone());
                Ok(settlement)
            }
            _ => Err(EngineError::SettlementNotFound(settlement.id.to_string())),
        }
    }

    async fn set_fee_config(&self, config: FeeConfig) -> Result<(), EngineError> {
        *self.fee_config.lock().await = Some(config);
        Ok(())
    }

    async fn get_fee_config(&self) -> Result<Option<FeeConfig>, EngineError> {
        Ok(self.fee_config.lock().await.clone())
    }

    async fn save_engine_audit(&self, audit: EngineAudit) -> Result<(), EngineError> {
        let mut audits = self.engine_audits.lock().await;
        audits
            .entry(audit.offering_id)
            .or_insert_with(Vec::new)
            .push(audit);
        Ok(())
    }

    async fn get_engine_audits(&self, offering_id: Uuid) -> Result<Vec<EngineAudit>, EngineError> {
        // For production: add pagination
        Ok(self
            .engine_audits
            .lock()
            .await
            .get(&offering_id)
            .cloned()
            .unwrap_or_default())
    }
}
