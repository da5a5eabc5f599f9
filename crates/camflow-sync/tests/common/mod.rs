#![allow(dead_code)]

use async_trait::async_trait;
use camflow_cloud::{
    AdapterFactory, AssetType, CloudAccount, CloudAdapter, CloudError, CloudInstance, Credentials,
    Provider, Region,
};
use camflow_sync::{
    Instance, InstanceStore, MemoryAccountStore, MemoryInstanceStore, Reconciler, SyncConfig,
    SyncError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn account(id: i64) -> CloudAccount {
    CloudAccount::new(
        id,
        format!("account-{id}"),
        Provider::Aliyun,
        "tenant-1",
        Credentials::new("ak", "sk"),
    )
}

pub fn ecs(id: &str, region: &str) -> CloudInstance {
    CloudInstance::new(id, format!("{id}-name"), AssetType::Ecs, region).with_status("Running")
}

/// Scripted provider: fixed regions, canned instances, injectable faults
#[derive(Default)]
pub struct FakeAdapter {
    regions: Vec<String>,
    instances: Mutex<HashMap<(String, AssetType), Vec<CloudInstance>>>,
    failing_regions: HashSet<String>,
    unsupported: HashSet<AssetType>,
    fail_region_listing: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeAdapter {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regions: regions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_instances(self, region: &str, asset_type: AssetType, ids: &[&str]) -> Self {
        self.set_instances(region, asset_type, ids);
        self
    }

    pub fn with_failing_region(mut self, region: &str) -> Self {
        self.failing_regions.insert(region.to_string());
        self
    }

    pub fn with_unsupported(mut self, asset_type: AssetType) -> Self {
        self.unsupported.insert(asset_type);
        self
    }

    pub fn with_region_listing_failure(mut self) -> Self {
        self.fail_region_listing = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace what the provider reports for one region and type
    pub fn set_instances(&self, region: &str, asset_type: AssetType, ids: &[&str]) {
        let live = ids
            .iter()
            .map(|id| CloudInstance::new(*id, format!("{id}-name"), asset_type, region))
            .collect();
        self.instances
            .lock()
            .unwrap()
            .insert((region.to_string(), asset_type), live);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudAdapter for FakeAdapter {
    fn provider(&self) -> Provider {
        Provider::Aliyun
    }

    async fn list_regions(&self) -> camflow_cloud::Result<Vec<Region>> {
        if self.fail_region_listing {
            return Err(CloudError::ApiError("region listing denied".into()));
        }
        Ok(self.regions.iter().map(Region::new).collect())
    }

    async fn list_instances(
        &self,
        region: &str,
        asset_type: AssetType,
    ) -> camflow_cloud::Result<Vec<CloudInstance>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unsupported.contains(&asset_type) {
            return Err(CloudError::AssetTypeNotSupported {
                provider: Provider::Aliyun.to_string(),
                asset_type: asset_type.as_str().to_string(),
            });
        }
        if self.failing_regions.contains(region) {
            return Err(CloudError::ApiError(format!("{region} unavailable")));
        }
        Ok(self
            .instances
            .lock()
            .unwrap()
            .get(&(region.to_string(), asset_type))
            .cloned()
            .unwrap_or_default())
    }
}

/// Hands out one shared adapter, refusing the listed accounts
pub struct FakeFactory {
    adapter: Option<Arc<FakeAdapter>>,
    refused: HashSet<i64>,
}

impl FakeFactory {
    pub fn new(adapter: Arc<FakeAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
            refused: HashSet::new(),
        }
    }

    pub fn refusing() -> Self {
        Self {
            adapter: None,
            refused: HashSet::new(),
        }
    }

    pub fn refuse(mut self, account_id: i64) -> Self {
        self.refused.insert(account_id);
        self
    }
}

#[async_trait]
impl AdapterFactory for FakeFactory {
    async fn create(&self, account: &CloudAccount) -> camflow_cloud::Result<Arc<dyn CloudAdapter>> {
        match &self.adapter {
            Some(adapter) if !self.refused.contains(&account.id) => Ok(adapter.clone()),
            _ => Err(CloudError::InvalidCredentials(format!(
                "account {} rejected",
                account.id
            ))),
        }
    }
}

/// Memory store with switchable failures
#[derive(Default)]
pub struct FlakyInstanceStore {
    pub inner: MemoryInstanceStore,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_upsert_ids: Mutex<HashSet<String>>,
}

#[async_trait]
impl InstanceStore for FlakyInstanceStore {
    async fn upsert(&self, instance: &Instance) -> camflow_sync::Result<()> {
        if self
            .fail_upsert_ids
            .lock()
            .unwrap()
            .contains(&instance.asset_id)
        {
            return Err(SyncError::Store(format!("write rejected for {}", instance.asset_id)));
        }
        self.inner.upsert(instance).await
    }

    async fn list_asset_ids_by_region(
        &self,
        tenant_id: &str,
        model_uid: &str,
        account_id: i64,
        region: &str,
    ) -> camflow_sync::Result<Vec<String>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SyncError::Store("query failed".into()));
        }
        self.inner
            .list_asset_ids_by_region(tenant_id, model_uid, account_id, region)
            .await
    }

    async fn delete_by_asset_ids(
        &self,
        tenant_id: &str,
        model_uid: &str,
        asset_ids: &[String],
    ) -> camflow_sync::Result<u64> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(SyncError::Store("delete failed".into()));
        }
        self.inner
            .delete_by_asset_ids(tenant_id, model_uid, asset_ids)
            .await
    }
}

pub struct Harness {
    pub adapter: Arc<FakeAdapter>,
    pub instances: Arc<FlakyInstanceStore>,
    pub accounts: Arc<MemoryAccountStore>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub async fn new(adapter: FakeAdapter, config: SyncConfig) -> Self {
        let adapter = Arc::new(adapter);
        let instances = Arc::new(FlakyInstanceStore::default());
        let accounts = Arc::new(MemoryAccountStore::new());
        accounts.insert(account(1)).await;

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(FakeFactory::new(adapter.clone())),
            instances.clone(),
            accounts.clone(),
            config,
        ));
        Self {
            adapter,
            instances,
            accounts,
            reconciler,
        }
    }

    /// Stored ecs asset ids of account 1 in `region`
    pub async fn stored_ids(&self, region: &str) -> Vec<String> {
        let mut ids = self
            .instances
            .inner
            .list_asset_ids_by_region("tenant-1", "aliyun_ecs", 1, region)
            .await
            .unwrap();
        ids.sort();
        ids
    }

    pub async fn seed(&self, region: &str, ids: &[&str]) {
        let account = account(1);
        for id in ids {
            let instance = Instance::from_cloud(&ecs(id, region), &account);
            self.instances.inner.upsert(&instance).await.unwrap();
        }
    }
}
