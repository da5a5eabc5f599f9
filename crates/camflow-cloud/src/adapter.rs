//! Cloud adapter traits and the provider registry

use crate::account::{CloudAccount, Provider};
use crate::asset::{AssetType, CloudInstance, Region};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read-only view of one account on one provider.
///
/// Implementations must be safe for concurrent use: the reconciler calls
/// `list_instances` for several regions of the same account at once.
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    /// Returns the provider this adapter talks to
    fn provider(&self) -> Provider;

    /// List the regions the provider offers to this account
    async fn list_regions(&self) -> Result<Vec<Region>>;

    /// Fetch every live instance of `asset_type` in `region`.
    ///
    /// Returns `CloudError::AssetTypeNotSupported` for types the provider
    /// does not expose.
    async fn list_instances(
        &self,
        region: &str,
        asset_type: AssetType,
    ) -> Result<Vec<CloudInstance>>;
}

/// Creates adapters from account credentials
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn create(&self, account: &CloudAccount) -> Result<Arc<dyn CloudAdapter>>;
}

/// Constructor for one provider's adapter
pub type AdapterCreator =
    Arc<dyn Fn(&CloudAccount) -> Result<Arc<dyn CloudAdapter>> + Send + Sync>;

/// Factory backed by per-provider constructors with a per-account cache.
///
/// Accounts must be active and carry a complete key pair before a
/// constructor is invoked.
#[derive(Default)]
pub struct ProviderRegistry {
    creators: RwLock<HashMap<Provider, AdapterCreator>>,
    cache: RwLock<HashMap<(Provider, i64), Arc<dyn CloudAdapter>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for `provider`, replacing any previous one
    pub fn register<F>(&self, provider: Provider, creator: F)
    where
        F: Fn(&CloudAccount) -> Result<Arc<dyn CloudAdapter>> + Send + Sync + 'static,
    {
        write_lock(&self.creators).insert(provider, Arc::new(creator));
        tracing::info!(%provider, "Registered cloud adapter");
    }

    pub fn supports(&self, provider: Provider) -> bool {
        read_lock(&self.creators).contains_key(&provider)
    }

    /// Drop every cached adapter, e.g. after credentials rotate
    pub fn clear_cache(&self) {
        write_lock(&self.cache).clear();
        tracing::debug!("Cleared adapter cache");
    }

    fn validate(account: &CloudAccount) -> Result<()> {
        if !account.credentials.is_complete() {
            return Err(CloudError::InvalidCredentials(format!(
                "account {} has no access key pair",
                account.id
            )));
        }
        if !account.is_active() {
            return Err(CloudError::AccountDisabled(account.id));
        }
        Ok(())
    }
}

#[async_trait]
impl AdapterFactory for ProviderRegistry {
    async fn create(&self, account: &CloudAccount) -> Result<Arc<dyn CloudAdapter>> {
        Self::validate(account)?;

        let key = (account.provider, account.id);
        if let Some(adapter) = read_lock(&self.cache).get(&key) {
            return Ok(adapter.clone());
        }

        let creator = read_lock(&self.creators)
            .get(&account.provider)
            .cloned()
            .ok_or_else(|| CloudError::ProviderNotSupported(account.provider.to_string()))?;

        let adapter = creator(account)?;
        write_lock(&self.cache).insert(key, adapter.clone());

        tracing::info!(
            provider = %account.provider,
            account_id = account.id,
            "Created cloud adapter"
        );
        Ok(adapter)
    }
}

// A poisoned lock only means another thread panicked mid-insert; the maps
// stay structurally valid, so keep serving them.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
