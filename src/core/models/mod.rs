pub mod allocation;
pub mod audit;
pub mod fees;
pub mod influencer;
pub mod offering;
pub mod participation;
pub mod settlement;
pub mod wallet;

pub use allocation::{AllocationStatus, CollectionOutcome, SplitBill};
pub use audit::{AppLog, EngineAudit};
pub use fees::{FeeConfig, FeeRate, ResolvedFees};
pub use influencer::{BankAccount, Influencer};
pub use offering::{Offering, OfferingRef, OfferingType};
pub use participation::{Participation, ParticipationStatus};
pub use settlement::{Settlement, SettlementStatus};
pub use wallet::{ExpenseWallet, WalletTransaction, WalletTxKind};
