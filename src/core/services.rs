use crate::constants::{
    ALLOCATION_COMPLETED, ALLOCATION_CREATED, ALLOCATION_RETRIED, FEE_CONFIG_UPDATED,
    INFLUENCER_REGISTERED, MAX_AMOUNT, OFFERING_REGISTERED, PARTICIPATION_APPLIED,
    PARTICIPATION_CANCELLED, PARTICIPATION_CONFIRMED, REFUND_QUOTED, SETTLEMENT_CALCULATED,
    SETTLEMENT_COMPLETED, SETTLEMENT_PROCESSING, TOPUP_REQUESTED, WALLET_CACHE_TTL_SECS,
    WALLET_CHARGED, WALLET_DEDUCTED, WALLET_QUERIED,
};
use crate::core::errors::EngineError;
use crate::core::fees::resolve_fees;
use crate::core::models::{
    allocation::{AllocationStatus, CollectionOutcome, SplitBill},
    audit::{AppLog, EngineAudit},
    fees::{FeeConfig, FeeRate},
    influencer::Influencer,
    offering::{Offering, OfferingRef, OfferingType},
    participation::{Participation, ParticipationStatus},
    settlement::{Settlement, SettlementStatus},
    wallet::{ExpenseWallet, WalletTransaction},
};
use crate::core::refund;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::storage::Storage;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

/// Wallet read model served to participants and admin screens: the cached
/// balance projection plus the full transaction history behind it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WalletSummaryResponse {
    wallet: ExpenseWallet,
    transactions: Vec<WalletTransaction>,
}

impl WalletSummaryResponse {
    pub fn wallet(&self) -> &ExpenseWallet {
        &self.wallet
    }

    pub fn transactions(&self) -> &Vec<WalletTransaction> {
        &self.transactions
    }
}

/// Result of creating or retrying a split-bill collection.
#[derive(Serialize, Debug, Clone)]
pub struct AllocationOutcome {
    pub allocation: SplitBill,
    pub per_person_amount: i64,
    /// Participants whose wallet could not cover the share. Non-empty means
    /// nothing was deducted from anyone.
    pub insufficient_balance_participants: Vec<Uuid>,
}

/// Answer to "how much should be refunded". Policy decision only; the
/// gateway refund itself is executed by the caller.
#[derive(Serialize, Debug, Clone)]
pub struct RefundQuote {
    pub participation_id: Uuid,
    pub participant_id: Uuid,
    pub days_until_start: i64,
    pub refund_rate: u32,
    pub paid_amount: i64,
    pub refund_amount: i64,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CancellationOutcome {
    pub participation: Participation,
    pub quote: RefundQuote,
}

#[derive(Serialize, Debug, Clone)]
pub struct ParticipantContribution {
    pub participant_id: Uuid,
    pub paid_amount: i64,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Settlement detail read model: the frozen gross/fee/net breakdown plus the
/// confirmed payments it was aggregated from.
#[derive(Serialize, Debug, Clone)]
pub struct SettlementBreakdownResponse {
    pub settlement: Settlement,
    pub contributions: Vec<ParticipantContribution>,
}

pub struct TripsplitService<L: LoggingService, S: Storage, C: Cache> {
    storage: S,
    logging: L,
    cache: C,
}

impl<L: LoggingService, S: Storage, C: Cache> TripsplitService<L, S, C> {
    pub fn new(storage: S, logging: L, cache: C) -> Self {
        TripsplitService {
            storage,
            logging,
            cache,
        }
    }

    async fn log_and_audit(
        &self,
        offering_id: Option<Uuid>,
        action: &str,
        details: serde_json::Value,
        actor_id: Option<Uuid>,
    ) -> Result<(), EngineError> {
        self.logging
            .log_action(action, details.clone(), actor_id)
            .await?;
        if let Some(oid) = offering_id {
            self.storage
                .save_engine_audit(EngineAudit {
                    id: Uuid::new_v4(),
                    offering_id: oid,
                    action: action.to_string(),
                    actor_id,
                    details,
                    timestamp: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    fn validate_string_input(
        &self,
        field: &str,
        value: &str,
        max_length: usize,
    ) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                field: field.to_string(),
                description: format!("{} cannot be empty", field),
            });
        }
        if value.len() > max_length {
            return Err(EngineError::InvalidInput {
                field: field.to_string(),
                description: format!("{} cannot exceed {} characters", field, max_length),
            });
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(EngineError::InvalidInput {
                field: field.to_string(),
                description: format!("{} contains invalid characters", field),
            });
        }
        Ok(())
    }

    fn validate_amount(&self, field: &str, amount: i64) -> Result<(), EngineError> {
        if amount <= 0 || amount > MAX_AMOUNT {
            return Err(EngineError::InvalidAmount(field.to_string(), amount));
        }
        Ok(())
    }

    // EXTERNAL COLLABORATOR STATE
    //
    // The catalog, influencer onboarding and application approval flows live
    // outside this engine; these registrations hand it the state it reads.

    pub async fn register_influencer(
        &self,
        influencer: Influencer,
    ) -> Result<Influencer, EngineError> {
        info!("Registering influencer {}", influencer.id);
        self.validate_string_input("name", &influencer.name, 100)?;
        self.validate_string_input("bank_name", &influencer.bank.bank_name, 100)?;
        self.validate_string_input("account_number", &influencer.bank.account_number, 100)?;
        self.validate_string_input("account_holder", &influencer.bank.account_holder, 100)?;

        self.storage.save_influencer(influencer.clone()).await?;
        self.log_and_audit(
            None,
            INFLUENCER_REGISTERED,
            json!({ "influencer_id": influencer.id, "name": influencer.name }),
            Some(influencer.id),
        )
        .await?;
        Ok(influencer)
    }

    pub async fn register_offering(&self, offering: Offering) -> Result<Offering, EngineError> {
        info!(
            "Registering {} offering {} for influencer {}",
            offering.offering_type, offering.id, offering.influencer_id
        );
        self.validate_string_input("title", &offering.title, 255)?;
        self.validate_amount("price", offering.price)?;
        self.storage
            .get_influencer(offering.influencer_id)
            .await?
            .ok_or_else(|| EngineError::InfluencerNotFound(offering.influencer_id.to_string()))?;

        self.storage.save_offering(offering.clone()).await?;
        self.log_and_audit(
            Some(offering.id),
            OFFERING_REGISTERED,
            json!({
                "offering_id": offering.id,
                "offering_type": offering.offering_type,
                "influencer_id": offering.influencer_id,
                "title": offering.title,
            }),
            Some(offering.influencer_id),
        )
        .await?;
        Ok(offering)
    }

    pub async fn apply_for_offering(
        &self,
        reference: OfferingRef,
        participant_id: Uuid,
    ) -> Result<Participation, EngineError> {
        info!(
            "Participant {} applying to offering {}",
            participant_id, reference
        );
        self.storage
            .get_offering(&reference)
            .await?
            .ok_or_else(|| EngineError::OfferingNotFound(reference.key()))?;

        let now = Utc::now();
        let participation = Participation {
            id: Uuid::new_v4(),
            offering: reference,
            participant_id,
            status: ParticipationStatus::Pending,
            paid_amount: None,
            applied_at: now,
            confirmed_at: None,
            cancelled_at: None,
        };
        self.storage
            .save_participation(participation.clone())
            .await?;

        self.log_and_audit(
            Some(reference.offering_id),
            PARTICIPATION_APPLIED,
            json!({ "participation_id": participation.id, "participant_id": participant_id }),
            Some(participant_id),
        )
        .await?;
        Ok(participation)
    }

    /// Records the approval flow's outcome: the slot is confirmed and the
    /// gateway-captured payment amount is attached.
    pub async fn confirm_participation(
        &self,
        participation_id: Uuid,
        paid_amount: i64,
    ) -> Result<Participation, EngineError> {
        info!("Confirming participation {}", participation_id);
        self.validate_amount("paid_amount", paid_amount)?;
        let mut participation = self
            .storage
            .get_participation(participation_id)
            .await?
            .ok_or_else(|| EngineError::ParticipationNotFound(participation_id.to_string()))?;

        if participation.status != ParticipationStatus::Pending {
            return Err(EngineError::InvalidInput {
                field: "status".to_string(),
                description: format!("participation is {:?}, expected pending", participation.status),
            });
        }

        let now = Utc::now();
        participation.status = ParticipationStatus::Confirmed;
        participation.paid_amount = Some(paid_amount);
        participation.confirmed_at = Some(now);
        self.storage
            .save_participation(participation.clone())
            .await?;

        self.log_and_audit(
            Some(participation.offering.offering_id),
            PARTICIPATION_CONFIRMED,
            json!({
                "participation_id": participation.id,
                "participant_id": participation.participant_id,
                "paid_amount": paid_amount,
            }),
            Some(participation.participant_id),
        )
        .await?;
        Ok(participation)
    }

    // REFUND POLICY

    fn build_quote(
        participation: &Participation,
        offering: &Offering,
        now: DateTime<Utc>,
    ) -> RefundQuote {
        let paid = participation.paid_amount.unwrap_or(0);
        let days = refund::days_until_start(offering.start_date, now);
        RefundQuote {
            participation_id: participation.id,
            participant_id: participation.participant_id,
            days_until_start: days,
            refund_rate: refund::refund_rate(days),
            paid_amount: paid,
            refund_amount: refund::refund_amount(offering.start_date, now, paid),
            quoted_at: now,
        }
    }

    /// Pure policy preview. For an already-cancelled participation the quote
    /// is pinned to the persisted cancellation timestamp, so it can never be
    /// recomputed against a different clock.
    pub async fn quote_refund(&self, participation_id: Uuid) -> Result<RefundQuote, EngineError> {
        let participation = self
            .storage
            .get_participation(participation_id)
            .await?
            .ok_or_else(|| EngineError::ParticipationNotFound(participation_id.to_string()))?;
        let offering = self
            .storage
            .get_offering(&participation.offering)
            .await?
            .ok_or_else(|| EngineError::OfferingNotFound(participation.offering.key()))?;

        let now = participation.cancelled_at.unwrap_or_else(Utc::now);
        let quote = Self::build_quote(&participation, &offering, now);
        debug!(
            "Refund quote for participation {}: {} days out, rate {}%, refund {}",
            participation_id, quote.days_until_start, quote.refund_rate, quote.refund_amount
        );

        self.log_and_audit(
            Some(participation.offering.offering_id),
            REFUND_QUOTED,
            json!({
                "participation_id": participation.id,
                "days_until_start": quote.days_until_start,
                "refund_rate": quote.refund_rate,
                "refund_amount": quote.refund_amount,
            }),
            Some(participation.participant_id),
        )
        .await?;
        Ok(quote)
    }

    /// Marks the participation cancelled and quotes the refund with the same
    /// timestamp it persists as `cancelled_at`. Executing the gateway refund
    /// stays with the caller.
    pub async fn cancel_participation(
        &self,
        participation_id: Uuid,
    ) -> Result<CancellationOutcome, EngineError> {
        info!("Cancelling participation {}", participation_id);
        let mut participation = self
            .storage
            .get_participation(participation_id)
            .await?
            .ok_or_else(|| EngineError::ParticipationNotFound(participation_id.to_string()))?;
        if participation.status == ParticipationStatus::Cancelled {
            return Err(EngineError::AlreadyCancelled(participation_id.to_string()));
        }
        let offering = self
            .storage
            .get_offering(&participation.offering)
            .await?
            .ok_or_else(|| EngineError::OfferingNotFound(participation.offering.key()))?;

        let now = Utc::now();
        let quote = Self::build_quote(&participation, &offering, now);
        participation.status = ParticipationStatus::Cancelled;
        participation.cancelled_at = Some(now);
        self.storage
            .save_participation(participation.clone())
            .await?;

        self.log_and_audit(
            Some(participation.offering.offering_id),
            PARTICIPATION_CANCELLED,
            json!({
                "participation_id": participation.id,
                "participant_id": participation.participant_id,
                "refund_rate": quote.refund_rate,
                "refund_amount": quote.refund_amount,
            }),
            Some(participation.participant_id),
        )
        .await?;
        Ok(CancellationOutcome {
            participation,
            quote,
        })
    }

    // EXPENSE WALLET LEDGER

    /// Credits a wallet from a gateway-verified payment event. The wallet is
    /// created lazily on first charge.
    pub async fn charge_wallet(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        description: Option<String>,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError> {
        info!(
            "Charging wallet ({}, {}) with {}",
            offering_id, participant_id, amount
        );
        self.validate_amount("amount", amount)?;
        let description = description.unwrap_or_else(|| "expense charge".to_string());
        let (wallet, tx) = self
            .storage
            .apply_charge(offering_id, participant_id, amount, description, Utc::now())
            .await?;

        self.cache
            .invalidate_wallet(offering_id, participant_id)
            .await?;
        self.log_and_audit(
            Some(offering_id),
            WALLET_CHARGED,
            json!({
                "participant_id": participant_id,
                "amount": amount,
                "balance_after": tx.balance_after,
                "transaction_id": tx.id,
            }),
            Some(participant_id),
        )
        .await?;
        Ok((wallet, tx))
    }

    /// Debits a wallet for a shared cost. Fails with `InsufficientBalance`
    /// and no mutation when the balance cannot cover it.
    pub async fn deduct_wallet(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        amount: i64,
        description: String,
    ) -> Result<(ExpenseWallet, WalletTransaction), EngineError> {
        info!(
            "Deducting {} from wallet ({}, {})",
            amount, offering_id, participant_id
        );
        self.validate_amount("amount", amount)?;
        let (wallet, tx) = self
            .storage
            .apply_deduct(
                offering_id,
                participant_id,
                amount,
                None,
                description,
                Utc::now(),
            )
            .await?;

        self.cache
            .invalidate_wallet(offering_id, participant_id)
            .await?;
        self.log_and_audit(
            Some(offering_id),
            WALLET_DEDUCTED,
            json!({
                "participant_id": participant_id,
                "amount": amount,
                "balance_after": tx.balance_after,
                "transaction_id": tx.id,
            }),
            Some(participant_id),
        )
        .await?;
        Ok((wallet, tx))
    }

    /// Current spendable balance; a wallet that was never charged reads 0.
    pub async fn wallet_balance(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<i64, EngineError> {
        Ok(self
            .storage
            .get_wallet(offering_id, participant_id)
            .await?
            .map(|w| w.balance)
            .unwrap_or(0))
    }

    /// Influencer's "please top up" signal. Moves no money; targets one
    /// participant or, when `participant_id` is `None`, every confirmed
    /// participant of the offering.
    pub async fn request_topup(
        &self,
        offering_id: Uuid,
        participant_id: Option<Uuid>,
        amount: i64,
    ) -> Result<Vec<ExpenseWallet>, EngineError> {
        info!(
            "Top-up of {} requested for offering {} ({})",
            amount,
            offering_id,
            participant_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "all confirmed".to_string())
        );
        self.validate_amount("amount", amount)?;

        let targets: Vec<Uuid> = match participant_id {
            Some(pid) => vec![pid],
            None => self
                .storage
                .get_participations_by_offering(offering_id)
                .await?
                .into_iter()
                .filter(Participation::is_confirmed)
                .map(|p| p.participant_id)
                .collect(),
        };

        let now = Utc::now();
        let mut wallets = Vec::with_capacity(targets.len());
        for pid in &targets {
            let wallet = self
                .storage
                .set_requested_amount(offering_id, *pid, amount, now)
                .await?;
            self.cache.invalidate_wallet(offering_id, *pid).await?;
            wallets.push(wallet);
        }

        self.log_and_audit(
            Some(offering_id),
            TOPUP_REQUESTED,
            json!({ "amount": amount, "participant_ids": targets }),
            None,
        )
        .await?;
        Ok(wallets)
    }

    pub async fn wallet_summary(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<WalletSummaryResponse, EngineError> {
        if let Some(summary) = self
            .cache
            .get_wallet_summary(offering_id, participant_id)
            .await?
        {
            return Ok(summary);
        }

        let wallet = self
            .storage
            .get_wallet(offering_id, participant_id)
            .await?
            .unwrap_or_else(|| ExpenseWallet::new(offering_id, participant_id, Utc::now()));
        let transactions = self
            .storage
            .get_wallet_transactions(offering_id, participant_id)
            .await?;
        let summary = WalletSummaryResponse {
            wallet,
            transactions,
        };

        self.cache
            .save_wallet_summary(
                offering_id,
                participant_id,
                &summary,
                std::time::Duration::from_secs(WALLET_CACHE_TTL_SECS),
            )
            .await?;
        self.log_and_audit(
            Some(offering_id),
            WALLET_QUERIED,
            json!({ "participant_id": participant_id }),
            Some(participant_id),
        )
        .await?;
        Ok(summary)
    }

    /// Audit check from the drift note in the design: replays the
    /// transaction log and compares it against the cached projection.
    /// Returns the replayed balance; any mismatch is the fatal ledger error.
    pub async fn verify_wallet_consistency(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<i64, EngineError> {
        let wallet = self
            .storage
            .get_wallet(offering_id, participant_id)
            .await?;
        let transactions = self
            .storage
            .get_wallet_transactions(offering_id, participant_id)
            .await?;

        let mut replayed = 0i64;
        for tx in &transactions {
            replayed += tx.signed_amount();
            if tx.balance_after != replayed {
                return Err(EngineError::LedgerInvariantViolation(format!(
                    "transaction {} recorded balance_after {} but replay gives {}",
                    tx.id, tx.balance_after, replayed
                )));
            }
        }

        let cached = wallet.as_ref().map(|w| w.balance).unwrap_or(0);
        if cached != replayed {
            return Err(EngineError::LedgerInvariantViolation(format!(
                "wallet ({}, {}) cached balance {} != replayed {}",
                offering_id, participant_id, cached, replayed
            )));
        }
        if let Some(w) = &wallet {
            if !w.is_consistent() {
                return Err(EngineError::LedgerInvariantViolation(format!(
                    "wallet ({}, {}) totals drifted: balance {}, charged {}, used {}",
                    offering_id, participant_id, w.balance, w.total_charged, w.total_used
                )));
            }
        }
        debug!(
            "Wallet ({}, {}) consistent at balance {}",
            offering_id, participant_id, replayed
        );
        Ok(replayed)
    }

    // SPLIT-BILL (N-BANG) ALLOCATION

    async fn confirmed_participant_ids(
        &self,
        offering_id: Uuid,
    ) -> Result<HashSet<Uuid>, EngineError> {
        Ok(self
            .storage
            .get_participations_by_offering(offering_id)
            .await?
            .into_iter()
            .filter(Participation::is_confirmed)
            .map(|p| p.participant_id)
            .collect())
    }

    /// Runs one all-or-nothing collection pass on a persisted allocation.
    /// The storage layer owns the pending guard, the deductions and the
    /// completion flip as one atomic step, so concurrent passes over the
    /// same bill collect at most once. Used by both creation and explicit
    /// retries.
    async fn run_collection(
        &self,
        allocation_id: Uuid,
    ) -> Result<AllocationOutcome, EngineError> {
        let (allocation, outcome) = self
            .storage
            .collect_for_allocation(allocation_id, Utc::now())
            .await?;

        let insufficient = match outcome {
            CollectionOutcome::Collected(transactions) => {
                for tx in &transactions {
                    self.cache
                        .invalidate_wallet(allocation.offering_id, tx.participant_id)
                        .await?;
                }
                self.log_and_audit(
                    Some(allocation.offering_id),
                    ALLOCATION_COMPLETED,
                    json!({
                        "allocation_id": allocation.id,
                        "per_person_amount": allocation.per_person_amount,
                        "participant_count": allocation.participant_ids.len(),
                    }),
                    None,
                )
                .await?;
                Vec::new()
            }
            CollectionOutcome::Insufficient(short) => {
                warn!(
                    "Allocation {} pending: {} participant(s) short of {}",
                    allocation.id,
                    short.len(),
                    allocation.per_person_amount
                );
                short
            }
        };

        Ok(AllocationOutcome {
            per_person_amount: allocation.per_person_amount,
            allocation,
            insufficient_balance_participants: insufficient,
        })
    }

    /// Splits a shared cost equally across the listed confirmed
    /// participants. The per-person share is `ceil(total / n)`, fixed for
    /// the lifetime of the allocation; collection is all-or-nothing.
    pub async fn create_allocation(
        &self,
        offering_id: Uuid,
        title: String,
        total_amount: i64,
        participant_ids: Vec<Uuid>,
        include_fee_in_amount: bool,
    ) -> Result<AllocationOutcome, EngineError> {
        info!(
            "Creating allocation '{}' of {} over {} participants for offering {}",
            title,
            total_amount,
            participant_ids.len(),
            offering_id
        );
        self.validate_string_input("title", &title, 255)?;
        self.validate_amount("total_amount", total_amount)?;
        if participant_ids.is_empty() {
            return Err(EngineError::EmptyParticipants);
        }
        let mut seen = HashSet::new();
        for pid in &participant_ids {
            if !seen.insert(*pid) {
                return Err(EngineError::DuplicateParticipant(pid.to_string()));
            }
        }
        let confirmed = self.confirmed_participant_ids(offering_id).await?;
        for pid in &participant_ids {
            if !confirmed.contains(pid) {
                return Err(EngineError::NotConfirmedParticipant(pid.to_string()));
            }
        }

        let participant_count = participant_ids.len() as i64;
        let per_person_amount = total_amount.div_euclid(participant_count)
            + (total_amount.rem_euclid(participant_count) != 0) as i64;
        let allocation = SplitBill {
            id: Uuid::new_v4(),
            offering_id,
            title,
            total_amount,
            per_person_amount,
            participant_ids,
            include_fee_in_amount,
            status: AllocationStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        let allocation_id = allocation.id;
        // Persisted pending first; the collection pass transitions it.
        self.storage.save_allocation(allocation.clone()).await?;

        self.log_and_audit(
            Some(offering_id),
            ALLOCATION_CREATED,
            json!({
                "allocation_id": allocation.id,
                "total_amount": allocation.total_amount,
                "per_person_amount": allocation.per_person_amount,
                "participant_count": allocation.participant_ids.len(),
            }),
            None,
        )
        .await?;
        self.run_collection(allocation_id).await
    }

    /// Re-runs collection for a pending allocation after participants have
    /// topped up. The share fixed at creation is reused, never recomputed;
    /// pending allocations are only ever retried through this explicit call.
    /// The status check here is a fast path; the authoritative pending guard
    /// sits inside the storage collection step.
    pub async fn retry_allocation(
        &self,
        allocation_id: Uuid,
    ) -> Result<AllocationOutcome, EngineError> {
        info!("Retrying collection for allocation {}", allocation_id);
        let allocation = self
            .storage
            .get_allocation(allocation_id)
            .await?
            .ok_or_else(|| EngineError::AllocationNotFound(allocation_id.to_string()))?;
        if allocation.status == AllocationStatus::Completed {
            return Err(EngineError::AllocationAlreadyCompleted(
                allocation_id.to_string(),
            ));
        }

        self.log_and_audit(
            Some(allocation.offering_id),
            ALLOCATION_RETRIED,
            json!({ "allocation_id": allocation.id }),
            None,
        )
        .await?;
        self.run_collection(allocation_id).await
    }

    /// Current state of an allocation: for a pending one the shortfall list
    /// is re-evaluated against live balances so the influencer can see who
    /// still needs to top up.
    pub async fn allocation_status(
        &self,
        allocation_id: Uuid,
    ) -> Result<AllocationOutcome, EngineError> {
        let allocation = self
            .storage
            .get_allocation(allocation_id)
            .await?
            .ok_or_else(|| EngineError::AllocationNotFound(allocation_id.to_string()))?;

        let mut insufficient = Vec::new();
        if allocation.status == AllocationStatus::Pending {
            for pid in &allocation.participant_ids {
                let balance = self.wallet_balance(allocation.offering_id, *pid).await?;
                if balance < allocation.per_person_amount {
                    insufficient.push(*pid);
                }
            }
        }
        Ok(AllocationOutcome {
            per_person_amount: allocation.per_person_amount,
            allocation,
            insufficient_balance_participants: insufficient,
        })
    }

    // SETTLEMENT

    pub async fn set_fee_config(
        &self,
        course_fee_rate: FeeRate,
        party_fee_rate: FeeRate,
        pg_fee_rate: FeeRate,
    ) -> Result<FeeConfig, EngineError> {
        let config = FeeConfig {
            course_fee_rate,
            party_fee_rate,
            pg_fee_rate,
            updated_at: Utc::now(),
        };
        self.storage.set_fee_config(config.clone()).await?;
        self.log_and_audit(
            None,
            FEE_CONFIG_UPDATED,
            json!({
                "course_fee_bps": course_fee_rate.basis_points(),
                "party_fee_bps": party_fee_rate.basis_points(),
                "pg_fee_bps": pg_fee_rate.basis_points(),
            }),
            None,
        )
        .await?;
        Ok(config)
    }

    pub async fn get_fee_config(&self) -> Result<Option<FeeConfig>, EngineError> {
        self.storage.get_fee_config().await
    }

    /// Aggregates every confirmed payment for the offering into one payout
    /// record, net of platform and gateway fees. Runs exactly once per
    /// offering; the storage layer's unique insert settles races.
    pub async fn calculate_settlement(
        &self,
        offering_type: OfferingType,
        offering_id: Uuid,
    ) -> Result<Settlement, EngineError> {
        let reference = OfferingRef::new(offering_type, offering_id);
        info!("Calculating settlement for offering {}", reference);

        if self
            .storage
            .get_settlement_by_offering(&reference)
            .await?
            .is_some()
        {
            warn!("Settlement for {} already calculated", reference);
            return Err(EngineError::AlreadyCalculated(reference.key()));
        }

        let offering = self
            .storage
            .get_offering(&reference)
            .await?
            .ok_or_else(|| EngineError::OfferingNotFound(reference.key()))?;
        let influencer = self
            .storage
            .get_influencer(offering.influencer_id)
            .await?
            .ok_or_else(|| EngineError::InfluencerNotFound(offering.influencer_id.to_string()))?;

        let gross_amount: i64 = self
            .storage
            .get_participations_by_offering(offering_id)
            .await?
            .iter()
            .filter(|p| p.offering == reference)
            .filter_map(Participation::settleable_amount)
            .sum();
        if gross_amount == 0 {
            return Err(EngineError::NothingToSettle(reference.key()));
        }

        let config = self.storage.get_fee_config().await?;
        let fees = resolve_fees(config.as_ref(), &influencer, offering_type);
        let fee_amount = fees.fee_rate.apply(gross_amount);
        let pg_fee_amount = fees.pg_fee_rate.apply(gross_amount);
        let net_amount = gross_amount - fee_amount - pg_fee_amount;

        let settlement = Settlement {
            id: Uuid::new_v4(),
            offering: reference,
            influencer_id: influencer.id,
            gross_amount,
            fee_rate: fees.fee_rate,
            fee_amount,
            pg_fee_rate: fees.pg_fee_rate,
            pg_fee_amount,
            net_amount,
            status: SettlementStatus::Pending,
            // Frozen here: later bank edits must not change this payout.
            bank: influencer.bank.clone(),
            calculated_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            receipt_url: None,
            notes: None,
        };
        let created = self.storage.insert_settlement(settlement).await?;
        debug!(
            "Settlement {} for {}: gross {}, fee {}, pg fee {}, net {}",
            created.id, reference, gross_amount, fee_amount, pg_fee_amount, net_amount
        );

        self.log_and_audit(
            Some(offering_id),
            SETTLEMENT_CALCULATED,
            json!({
                "settlement_id": created.id,
                "gross_amount": created.gross_amount,
                "fee_amount": created.fee_amount,
                "pg_fee_amount": created.pg_fee_amount,
                "net_amount": created.net_amount,
            }),
            Some(influencer.id),
        )
        .await?;
        Ok(created)
    }

    /// pending -> processing. Any other starting state is rejected.
    pub async fn process_settlement(&self, settlement_id: Uuid) -> Result<Settlement, EngineError> {
        info!("Processing settlement {}", settlement_id);
        let mut settlement = self
            .storage
            .get_settlement(settlement_id)
            .await?
            .ok_or_else(|| EngineError::SettlementNotFound(settlement_id.to_string()))?;
        if settlement.status != SettlementStatus::Pending {
            return Err(EngineError::InvalidState {
                settlement_id,
                current: settlement.status,
            });
        }

        settlement.status = SettlementStatus::Processing;
        settlement.processed_at = Some(Utc::now());
        // Compare-and-set on the status read above: a racing transition
        // makes this write fail with `InvalidState` instead of restamping.
        let updated = self
            .storage
            .update_settlement(settlement, SettlementStatus::Pending)
            .await?;

        self.log_and_audit(
            Some(updated.offering.offering_id),
            SETTLEMENT_PROCESSING,
            json!({ "settlement_id": updated.id }),
            Some(updated.influencer_id),
        )
        .await?;
        Ok(updated)
    }

    /// processing -> completed. Record-keeping only; the bank transfer
    /// itself happens outside this engine.
    pub async fn complete_settlement(
        &self,
        settlement_id: Uuid,
        receipt_url: Option<String>,
        notes: Option<String>,
    ) -> Result<Settlement, EngineError> {
        info!("Completing settlement {}", settlement_id);
        let mut settlement = self
            .storage
            .get_settlement(settlement_id)
            .await?
            .ok_or_else(|| EngineError::SettlementNotFound(settlement_id.to_string()))?;
        if settlement.status != SettlementStatus::Processing {
            return Err(EngineError::InvalidState {
                settlement_id,
                current: settlement.status,
            });
        }

        settlement.status = SettlementStatus::Completed;
        settlement.completed_at = Some(Utc::now());
        settlement.receipt_url = receipt_url;
        settlement.notes = notes;
        let updated = self
            .storage
            .update_settlement(settlement, SettlementStatus::Processing)
            .await?;

        self.log_and_audit(
            Some(updated.offering.offering_id),
            SETTLEMENT_COMPLETED,
            json!({ "settlement_id": updated.id, "net_amount": updated.net_amount }),
            Some(updated.influencer_id),
        )
        .await?;
        Ok(updated)
    }

    pub async fn get_settlement(
        &self,
        settlement_id: Uuid,
    ) -> Result<Option<Settlement>, EngineError> {
        self.storage.get_settlement(settlement_id).await
    }

    pub async fn settlement_breakdown(
        &self,
        offering_type: OfferingType,
        offering_id: Uuid,
    ) -> Result<SettlementBreakdownResponse, EngineError> {
        let reference = OfferingRef::new(offering_type, offering_id);
        let settlement = self
            .storage
            .get_settlement_by_offering(&reference)
            .await?
            .ok_or_else(|| EngineError::SettlementNotFound(reference.key()))?;

        let contributions = self
            .storage
            .get_participations_by_offering(offering_id)
            .await?
            .into_iter()
            .filter(|p| p.offering == reference && p.is_confirmed())
            .filter_map(|p| {
                p.paid_amount.map(|paid| ParticipantContribution {
                    participant_id: p.participant_id,
                    paid_amount: paid,
                    confirmed_at: p.confirmed_at,
                })
            })
            .collect();

        Ok(SettlementBreakdownResponse {
            settlement,
            contributions,
        })
    }

    // READ MODELS FOR ADMIN / UI

    pub async fn get_allocations(&self, offering_id: Uuid) -> Result<Vec<SplitBill>, EngineError> {
        self.storage.get_allocations_by_offering(offering_id).await
    }

    pub async fn get_engine_audits(
        &self,
        offering_id: Uuid,
    ) -> Result<Vec<EngineAudit>, EngineError> {
        self.storage.get_engine_audits(offering_id).await
    }

    pub async fn get_app_logs(&self) -> Result<Vec<AppLog>, EngineError> {
        self.logging.get_logs().await
    }

    pub async fn get_offering(
        &self,
        reference: &OfferingRef,
    ) -> Result<Option<Offering>, EngineError> {
        self.storage.get_offering(reference).await
    }

    pub async fn get_participation(
        &self,
        participation_id: Uuid,
    ) -> Result<Option<Participation>, EngineError> {
        self.storage.get_participation(participation_id).await
    }
}
