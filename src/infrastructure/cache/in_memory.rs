use crate::core::errors::EngineError;
use crate::core::services::WalletSummaryResponse;
use crate::infrastructure::cache::{Cache, cache_keys};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub struct InMemoryCache {
    cache: Arc<RwLock<HashMap<String, (WalletSummaryResponse, chrono::DateTime<chrono::Utc>)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache {
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_wallet_summary(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<WalletSummaryResponse>, EngineError> {
        let cache = self.cache.read().await;
        let key = cache_keys::wallet_summary_key(offering_id, participant_id);
        Ok(cache
            .get(&key)
            .filter(|(_, expiry)| *expiry > chrono::Utc::now())
            .map(|(summary, _)| summary.clone()))
    }

    async fn save_wallet_summary(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
        summary: &WalletSummaryResponse,
        ttl: std::time::Duration,
    ) -> Result<(), EngineError> {
        let mut cache = self.cache.write().await;
        let key = cache_keys::wallet_summary_key(offering_id, participant_id);
        let expiry = chrono::Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| EngineError::CacheError(format!("Failed to convert TTL: {}", e)))?;
        cache.insert(key, (summary.clone(), expiry));
        Ok(())
    }

    async fn invalidate_wallet(
        &self,
        offering_id: Uuid,
        participant_id: Uuid,
    ) -> Result<(), EngineError> {
        let mut cache = self.cache.write().await;
        cache.remove(&cache_keys::wallet_summary_key(offering_id, participant_id));
        cache.retain(|_, (_, expiry)| *expiry > chrono::Utc::now());
        Ok(())
    }
}
