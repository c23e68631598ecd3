pub mod cache_keys;
pub mod in_memory;

use crate::core::errors::EngineError;
use crate::core::services::WalletSummaryResponse;
use async_trait::async_trait;
use uuid::Uuid;

/// Read-model cache for wallet summaries. Invalidated on every mutation of
/// the underlying wallet so the projection never serves stale money.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_wallet_summary(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<WalletSummaryResponse>, EngineError>;
    async fn save_wallet_summary(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        summary: &WalletSummaryResponse,
        ttl: std::time::Duration,
    ) -> Result<(), EngineError>;
    async fn invalidate_wallet(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<(), EngineError>;
}
