// Audit action names recorded through the logging service.
pub const INFLUENCER_REGISTERED: &str = "influencer_registered";
pub const OFFERING_REGISTERED: &str = "offering_registered";
pub const PARTICIPATION_APPLIED: &str = "participation_applied";
pub const PARTICIPATION_CONFIRMED: &str = "participation_confirmed";
pub const PARTICIPATION_CANCELLED: &str = "participation_cancelled";
pub const WALLET_CHARGED: &str = "wallet_charged";
pub const WALLET_DEDUCTED: &str = "wallet_deducted";
pub const TOPUP_REQUESTED: &str = "topup_requested";
pub const WALLET_QUERIED: &str = "wallet_queried";
pub const REFUND_QUOTED: &str = "refund_quoted";
pub const ALLOCATION_CREATED: &str = "allocation_created";
pub const ALLOCATION_COMPLETED: &str = "allocation_completed";
pub const ALLOCATION_RETRIED: &str = "allocation_retried";
pub const SETTLEMENT_CALCULATED: &str = "settlement_calculated";
pub const SETTLEMENT_PROCESSING: &str = "settlement_processing";
pub const SETTLEMENT_COMPLETED: &str = "settlement_completed";
pub const FEE_CONFIG_UPDATED: &str = "fee_config_updated";

/// Safety-net platform fee applied when no fee config has been stored.
/// 10%, expressed in hundredths of a percent.
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 1_000;

/// Safety-net payment-gateway fee: 3.3%.
pub const DEFAULT_PG_FEE_BPS: u32 = 330;

/// Upper bound accepted for any single monetary amount.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// How long a cached wallet summary stays valid; every mutation of the
/// wallet invalidates it early.
pub const WALLET_CACHE_TTL_SECS: u64 = 3_600;

// Cancellation refund bands, in whole days before the offering starts.
// The rate for each band applies down to and including its lower bound.
pub const REFUND_FULL_OVER_DAYS: i64 = 30;
pub const REFUND_80_FROM_DAYS: i64 = 15;
pub const REFUND_50_FROM_DAYS: i64 = 8;
pub const REFUND_30_FROM_DAYS: i64 = 4;
