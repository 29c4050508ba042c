//! Non-persistent policy store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::CopyPolicy;
use crate::traits::PolicyStore;

/// Keeps the policy in memory; it is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policy: RwLock<Option<CopyPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self) -> Result<Option<CopyPolicy>, StoreError> {
        Ok(self.policy.read().await.clone())
    }

    async fn replace(&self, policy: CopyPolicy) -> Result<CopyPolicy, StoreError> {
        *self.policy.write().await = Some(policy.clone());
        Ok(policy)
    }

    async fn clear(&self) -> Result<bool, StoreError> {
        Ok(self.policy.write().await.take().is_some())
    }
}
