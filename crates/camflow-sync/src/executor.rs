//! Task executors backed by the [`Reconciler`]

use async_trait::async_trait;
use camflow_task::{TaskContext, TaskExecutor, TaskOutput, TaskParams, TaskType};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::reconciler::{Reconciler, SyncEvent};

/// Runs `sync_assets` tasks
pub struct SyncAssetsExecutor {
    reconciler: Arc<Reconciler>,
}

impl SyncAssetsExecutor {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl TaskExecutor for SyncAssetsExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::SyncAssets
    }

    async fn execute(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<TaskOutput> {
        let TaskParams::SyncAssets(params) = ctx.params().clone() else {
            return Err(SyncError::InvalidParams("expected sync_assets parameters".into()).into());
        };
        let reconciler = self.reconciler.as_ref();

        let result = match (params.account_id, params.provider) {
            (Some(account_id), _) => {
                ctx.report(10, format!("loading cloud account {account_id}"))
                    .await;
                let account = reconciler.accounts().get(account_id).await?;

                ctx.report(20, format!("connecting to {}", account.provider))
                    .await;
                let (tx, mut rx) = mpsc::unbounded_channel();
                let sync = async move {
                    reconciler
                        .sync_account_observed(&account, &params.asset_types, &params.regions, &tx)
                        .await
                };
                let progress = async {
                    while let Some(event) = rx.recv().await {
                        let (progress, message) = describe(&event);
                        ctx.report(progress, message).await;
                    }
                };
                let (result, ()) = tokio::join!(sync, progress);
                result?
            }
            (None, Some(provider)) => {
                ctx.report(20, format!("syncing all active {provider} accounts"))
                    .await;
                reconciler
                    .sync_provider(params.tenant_id.as_deref(), provider, &params.asset_types)
                    .await?
            }
            (None, None) => {
                return Err(SyncError::InvalidParams(
                    "either account_id or provider is required".into(),
                )
                .into());
            }
        };

        ctx.report(95, format!("synced {} assets", result.total_synced))
            .await;
        Ok(TaskOutput::SyncAssets(result))
    }
}

/// Map a reconciliation event onto the 30..90 progress band
fn describe(event: &SyncEvent) -> (u8, String) {
    match event {
        SyncEvent::RegionsResolved { total } => (30, format!("syncing {total} regions")),
        SyncEvent::RegionFinished {
            region,
            done,
            total,
            synced,
        } => {
            let progress = 30 + (done * 60 / (*total).max(1)).min(60);
            (
                progress as u8,
                format!("region {region} synced {synced} assets ({done}/{total})"),
            )
        }
    }
}

/// Runs `discover_assets` tasks
pub struct DiscoverAssetsExecutor {
    reconciler: Arc<Reconciler>,
}

impl DiscoverAssetsExecutor {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl TaskExecutor for DiscoverAssetsExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::DiscoverAssets
    }

    async fn execute(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<TaskOutput> {
        let TaskParams::DiscoverAssets(params) = ctx.params().clone() else {
            return Err(
                SyncError::InvalidParams("expected discover_assets parameters".into()).into(),
            );
        };
        if params.region.is_empty() {
            return Err(SyncError::InvalidParams("region is required".into()).into());
        }

        ctx.report(10, format!("loading cloud account {}", params.account_id))
            .await;
        let account = self.reconciler.accounts().get(params.account_id).await?;

        ctx.report(30, format!("discovering assets in {}", params.region))
            .await;
        let discovered = self
            .reconciler
            .discover(&account, &params.region, &params.asset_types)
            .await?;

        ctx.report(95, format!("found {} assets", discovered.count))
            .await;
        Ok(TaskOutput::DiscoverAssets(discovered))
    }
}
