//! Account reconciliation
//!
//! For each region of an account the [`Reconciler`] lists live instances,
//! diffs them against the stored ids, deletes what disappeared and upserts
//! everything that is live. Regions run concurrently up to
//! [`SyncConfig::region_concurrency`]; failures inside a region are counted
//! in the [`SyncResult`] rather than aborting the account.

use camflow_cloud::{
    AdapterFactory, AssetSelection, AssetType, CloudAccount, CloudAdapter, CloudError, IssueScope,
    Provider, SyncIssue, SyncResult,
};
use camflow_task::DiscoverAssetsResult;
use futures_util::StreamExt;
use futures_util::stream;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::diff::{ChangeKind, RegionPlan};
use crate::error::{Result, SyncError};
use crate::store::{AccountStore, Instance, InstanceStore};

pub const DEFAULT_REGION_CONCURRENCY: usize = 5;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Regions reconciled at the same time for one account
    pub region_concurrency: usize,
    /// Limit for each adapter or store call; `None` disables it
    pub call_timeout: Option<Duration>,
    /// Used when a request names no asset types
    pub default_asset_types: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            region_concurrency: DEFAULT_REGION_CONCURRENCY,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            default_asset_types: vec![AssetType::Ecs.as_str().to_string()],
        }
    }
}

/// Progress notifications emitted during an account sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    RegionsResolved { total: usize },
    RegionFinished {
        region: String,
        done: usize,
        total: usize,
        synced: usize,
    },
}

pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: SyncEvent);
}

impl SyncObserver for () {
    fn on_event(&self, _event: SyncEvent) {}
}

impl SyncObserver for mpsc::UnboundedSender<SyncEvent> {
    fn on_event(&self, event: SyncEvent) {
        let _ = self.send(event);
    }
}

/// Diffs provider state into the instance store
pub struct Reconciler {
    factory: Arc<dyn AdapterFactory>,
    instances: Arc<dyn InstanceStore>,
    accounts: Arc<dyn AccountStore>,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        instances: Arc<dyn InstanceStore>,
        accounts: Arc<dyn AccountStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            factory,
            instances,
            accounts,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    /// Sync one account, restricted to `regions` when non-empty
    pub async fn sync_account(
        &self,
        account: &CloudAccount,
        asset_types: &[String],
        regions: &[String],
    ) -> Result<SyncResult> {
        self.sync_account_observed(account, asset_types, regions, &())
            .await
    }

    pub async fn sync_account_by_id(
        &self,
        account_id: i64,
        asset_types: &[String],
        regions: &[String],
    ) -> Result<SyncResult> {
        let account = self.accounts.get(account_id).await?;
        self.sync_account(&account, asset_types, regions).await
    }

    /// Like [`Reconciler::sync_account`], reporting region completion to
    /// `observer` as it happens.
    ///
    /// Adapter creation and region listing failures abort the call before
    /// any region is touched.
    pub async fn sync_account_observed(
        &self,
        account: &CloudAccount,
        asset_types: &[String],
        regions: &[String],
        observer: &dyn SyncObserver,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::started();
        let selection = self.select(asset_types);
        for name in &selection.unknown {
            tracing::warn!(account_id = account.id, asset_type = %name, "Skipping unknown asset type");
            result.fail(
                SyncIssue::new(IssueScope::Account, format!("unknown asset type: {name}"))
                    .account(account.id),
            );
        }

        let adapter = self.factory.create(account).await?;
        let regions = self.resolve_regions(adapter.as_ref(), account, regions).await?;
        let total = regions.len();
        observer.on_event(SyncEvent::RegionsResolved { total });

        tracing::info!(
            account_id = account.id,
            provider = %account.provider,
            regions = total,
            asset_types = ?selection.types,
            "Starting account sync"
        );

        let done = &AtomicUsize::new(0);
        let adapter = adapter.as_ref();
        let types = selection.types.as_slice();
        let mut jobs = Vec::with_capacity(total);
        for region in regions {
            jobs.push(async move {
                let region_result = self.sync_region(adapter, account, &region, types).await;
                let done = done.fetch_add(1, Ordering::SeqCst) + 1;
                observer.on_event(SyncEvent::RegionFinished {
                    synced: region_result.total_synced,
                    region,
                    done,
                    total,
                });
                region_result
            });
        }

        let region_results: Vec<SyncResult> = stream::iter(jobs)
            .buffer_unordered(self.config.region_concurrency.max(1))
            .collect()
            .await;
        for region_result in region_results {
            result.merge(region_result);
        }
        let result = result.finish();

        if let Err(e) = self
            .accounts
            .update_sync_time(account.id, result.end_time, result.total_synced as i64)
            .await
        {
            tracing::warn!(account_id = account.id, error = %e, "Failed to record sync time");
        }

        tracing::info!(
            account_id = account.id,
            synced = result.total_synced,
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            failed = result.failed,
            duration_ms = result.duration_ms,
            "Account sync finished"
        );
        Ok(result)
    }

    /// Sync every active account of `provider`.
    ///
    /// Accounts that fail fatally are recorded as issues and skipped.
    pub async fn sync_provider(
        &self,
        tenant_id: Option<&str>,
        provider: Provider,
        asset_types: &[String],
    ) -> Result<SyncResult> {
        let accounts = self.accounts.list_active(tenant_id, provider).await?;
        if accounts.is_empty() {
            return Err(SyncError::NoActiveAccounts(provider));
        }

        let mut result = SyncResult::started();
        for account in &accounts {
            match self.sync_account(account, asset_types, &[]).await {
                Ok(account_result) => result.merge(account_result),
                Err(e) => {
                    tracing::error!(account_id = account.id, error = %e, "Account sync failed");
                    result.fail(
                        SyncIssue::new(IssueScope::Account, e.to_string()).account(account.id),
                    );
                }
            }
        }
        Ok(result.finish())
    }

    /// List live instances of one region without touching the store
    pub async fn discover(
        &self,
        account: &CloudAccount,
        region: &str,
        asset_types: &[String],
    ) -> Result<DiscoverAssetsResult> {
        let selection = self.select(asset_types);
        let adapter = self.factory.create(account).await?;

        let mut discovered = DiscoverAssetsResult::default();
        for name in selection.unknown {
            discovered.issues.push(
                SyncIssue::new(IssueScope::Account, format!("unknown asset type: {name}"))
                    .account(account.id),
            );
        }

        for asset_type in selection.types {
            match self
                .call("list instances", adapter.list_instances(region, asset_type))
                .await
            {
                Err(e) if is_unsupported(&e) => {
                    tracing::debug!(account_id = account.id, region, %asset_type, "Asset type not offered by provider");
                }
                Ok(instances) => {
                    discovered.count += instances.len();
                    *discovered.by_asset_type.entry(asset_type).or_default() += instances.len();
                    discovered.assets.extend(instances);
                }
                Err(e) => {
                    tracing::warn!(account_id = account.id, region, %asset_type, error = %e, "Discovery failed");
                    discovered.issues.push(
                        SyncIssue::new(IssueScope::Region, e.to_string())
                            .account(account.id)
                            .region(region)
                            .asset_type(asset_type),
                    );
                }
            }
        }
        Ok(discovered)
    }

    fn select(&self, asset_types: &[String]) -> AssetSelection {
        if asset_types.is_empty() {
            AssetSelection::expand(&self.config.default_asset_types)
        } else {
            AssetSelection::expand(asset_types)
        }
    }

    async fn resolve_regions(
        &self,
        adapter: &dyn CloudAdapter,
        account: &CloudAccount,
        requested: &[String],
    ) -> Result<Vec<String>> {
        let available = self
            .call("list regions", adapter.list_regions())
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        Ok(account.filter_regions(available, requested))
    }

    async fn sync_region(
        &self,
        adapter: &dyn CloudAdapter,
        account: &CloudAccount,
        region: &str,
        types: &[AssetType],
    ) -> SyncResult {
        let mut result = SyncResult::started();
        for &asset_type in types {
            result.merge(
                self.sync_region_type(adapter, account, region, asset_type)
                    .await,
            );
        }
        result.finish()
    }

    async fn sync_region_type(
        &self,
        adapter: &dyn CloudAdapter,
        account: &CloudAccount,
        region: &str,
        asset_type: AssetType,
    ) -> SyncResult {
        let mut result = SyncResult::started();
        let model_uid = asset_type.model_uid(account.provider);
        let issue = |scope, message: String| {
            SyncIssue::new(scope, message)
                .account(account.id)
                .region(region)
                .asset_type(asset_type)
        };

        let live = match self
            .call("list instances", adapter.list_instances(region, asset_type))
            .await
        {
            Ok(live) => live,
            Err(e) if is_unsupported(&e) => {
                tracing::debug!(account_id = account.id, region, %asset_type, "Asset type not offered by provider");
                return result.finish();
            }
            Err(e) => {
                tracing::warn!(account_id = account.id, region, %asset_type, error = %e, "Failed to list live instances");
                result.fail(issue(IssueScope::Region, e.to_string()));
                return result.finish();
            }
        };

        let existing = match self
            .call(
                "list stored ids",
                self.instances.list_asset_ids_by_region(
                    &account.tenant_id,
                    &model_uid,
                    account.id,
                    region,
                ),
            )
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(account_id = account.id, region, %asset_type, error = %e, "Failed to list stored instances");
                result.fail(issue(
                    IssueScope::Region,
                    format!("listing stored assets: {e}"),
                ));
                Vec::new()
            }
        };

        let plan = RegionPlan::compute(&existing, &live);
        if plan.is_empty() {
            return result.finish();
        }
        tracing::debug!(
            region,
            %asset_type,
            creates = plan.creates(),
            updates = plan.updates(),
            deletes = plan.to_delete.len(),
            "Planned region changes"
        );

        if !plan.to_delete.is_empty() {
            match self
                .call(
                    "delete stale instances",
                    self.instances.delete_by_asset_ids(
                        &account.tenant_id,
                        &model_uid,
                        &plan.to_delete,
                    ),
                )
                .await
            {
                Ok(deleted) => {
                    tracing::debug!(region, %asset_type, deleted, "Deleted stale instances");
                    result.deleted += deleted as usize;
                }
                Err(e) => {
                    tracing::error!(region, %asset_type, count = plan.to_delete.len(), error = %e, "Failed to delete stale instances");
                    result.fail(issue(IssueScope::Delete, e.to_string()));
                }
            }
        }

        for (kind, live_instance) in &plan.upserts {
            let instance = Instance::from_cloud(live_instance, account);
            match self.call("upsert instance", self.instances.upsert(&instance)).await {
                Ok(()) => {
                    result.total_synced += 1;
                    match kind {
                        ChangeKind::Create => result.created += 1,
                        ChangeKind::Update => result.updated += 1,
                    }
                    *result.by_asset_type.entry(asset_type).or_default() += 1;
                    *result.by_region.entry(region.to_string()).or_default() += 1;
                }
                Err(e) => {
                    tracing::error!(region, asset_id = %instance.asset_id, change = %kind, error = %e, "Failed to save instance");
                    result.fail(
                        issue(IssueScope::Instance, e.to_string()).asset_id(&instance.asset_id),
                    );
                }
            }
        }

        tracing::debug!(
            account_id = account.id,
            region,
            %asset_type,
            live = live.len(),
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            "Region synced"
        );
        result.finish()
    }

    /// Await `fut` under the configured call timeout
    async fn call<T, E, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<SyncError>,
    {
        match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(out) => out.map_err(Into::into),
                Err(_) => Err(SyncError::Timeout(format!("{what} after {limit:?}"))),
            },
            None => fut.await.map_err(Into::into),
        }
    }
}

fn is_unsupported(error: &SyncError) -> bool {
    matches!(
        error,
        SyncError::Adapter(CloudError::AssetTypeNotSupported { .. })
    )
}
