//! Typed task parameters and results
//!
//! Each task type carries its own parameter and result structs. On the
//! wire they flatten into a `type`-tagged JSON object, which is the shape
//! persisted by task stores.

use camflow_cloud::{AssetType, CloudInstance, Provider, SyncIssue, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::TaskType;

/// Parameters for a sync run.
///
/// With `account_id` set the run covers that account only; otherwise every
/// active account of `provider` within `tenant_id` is synced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAssetsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Asset type or group names; empty means `ecs`
    #[serde(default)]
    pub asset_types: Vec<String>,

    /// Region restriction; empty means every allowed region
    #[serde(default)]
    pub regions: Vec<String>,
}

impl SyncAssetsParams {
    pub fn for_account(account_id: i64) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    pub fn for_provider(tenant_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    pub fn with_asset_types<I, S>(mut self, asset_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_types = asset_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }
}

/// Parameters for a read-only discovery of one region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverAssetsParams {
    pub account_id: i64,
    pub region: String,
    #[serde(default)]
    pub asset_types: Vec<String>,
}

/// What a discovery found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverAssetsResult {
    pub count: usize,
    pub by_asset_type: HashMap<AssetType, usize>,
    pub assets: Vec<CloudInstance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<SyncIssue>,
}

/// Parameters of a task, one variant per [`TaskType`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskParams {
    SyncAssets(SyncAssetsParams),
    DiscoverAssets(DiscoverAssetsParams),
}

impl TaskParams {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskParams::SyncAssets(_) => TaskType::SyncAssets,
            TaskParams::DiscoverAssets(_) => TaskType::DiscoverAssets,
        }
    }
}

/// Result of a successful task, one variant per [`TaskType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    SyncAssets(SyncResult),
    DiscoverAssets(DiscoverAssetsResult),
}

impl TaskOutput {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskOutput::SyncAssets(_) => TaskType::SyncAssets,
            TaskOutput::DiscoverAssets(_) => TaskType::DiscoverAssets,
        }
    }
}
