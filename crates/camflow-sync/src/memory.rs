//! In-memory instance and account stores

use async_trait::async_trait;
use camflow_cloud::{CloudAccount, Provider};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{Result, SyncError};
use crate::store::{AccountStore, Instance, InstanceKey, InstanceStore};

#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    instances: RwLock<BTreeMap<InstanceKey, Instance>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &InstanceKey) -> Option<Instance> {
        self.instances.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Every stored instance, ordered by key
    pub async fn all(&self) -> Vec<Instance> {
        self.instances.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn upsert(&self, instance: &Instance) -> Result<()> {
        self.instances
            .write()
            .await
            .insert(instance.key(), instance.clone());
        Ok(())
    }

    async fn list_asset_ids_by_region(
        &self,
        tenant_id: &str,
        model_uid: &str,
        account_id: i64,
        region: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter(|i| {
                i.tenant_id == tenant_id
                    && i.model_uid == model_uid
                    && i.account_id == account_id
                    && i.region() == Some(region)
            })
            .map(|i| i.asset_id.clone())
            .collect())
    }

    async fn delete_by_asset_ids(
        &self,
        tenant_id: &str,
        model_uid: &str,
        asset_ids: &[String],
    ) -> Result<u64> {
        let mut instances = self.instances.write().await;
        let mut removed = 0;
        for asset_id in asset_ids {
            let key = InstanceKey {
                tenant_id: tenant_id.to_string(),
                model_uid: model_uid.to_string(),
                asset_id: asset_id.clone(),
            };
            if instances.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<BTreeMap<i64, CloudAccount>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: CloudAccount) {
        self.accounts.write().await.insert(account.id, account);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: i64) -> Result<CloudAccount> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SyncError::AccountNotFound(id))
    }

    async fn list_active(
        &self,
        tenant_id: Option<&str>,
        provider: Provider,
    ) -> Result<Vec<CloudAccount>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.provider == provider && a.is_active())
            .filter(|a| tenant_id.is_none_or(|t| a.tenant_id == t))
            .cloned()
            .collect())
    }

    async fn update_sync_time(&self, id: i64, at: DateTime<Utc>, asset_count: i64) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(SyncError::AccountNotFound(id))?;
        account.last_sync_time = Some(at);
        account.asset_count = asset_count;
        Ok(())
    }
}
