//! Persistence seams for stored instances and cloud accounts

use async_trait::async_trait;
use camflow_cloud::{CloudAccount, CloudInstance, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::error::Result;

/// Natural identity of a stored instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub tenant_id: String,
    pub model_uid: String,
    pub asset_id: String,
}

/// A cloud asset as persisted in the instance store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub tenant_id: String,
    /// `{provider}_{asset_type}`, e.g. `aliyun_ecs`
    pub model_uid: String,
    pub asset_id: String,
    pub asset_name: String,
    pub account_id: i64,
    pub attributes: HashMap<String, Value>,
}

impl Instance {
    /// Build the stored record for a live instance of `account`.
    ///
    /// Provider attributes are kept and the placement, status and owning
    /// account are written on top of them.
    pub fn from_cloud(instance: &CloudInstance, account: &CloudAccount) -> Self {
        let mut attributes = instance.attributes.clone();
        attributes.insert("status".into(), json!(instance.status));
        attributes.insert("region".into(), json!(instance.region));
        attributes.insert("zone".into(), json!(instance.zone));
        attributes.insert("provider".into(), json!(account.provider));
        attributes.insert("asset_type".into(), json!(instance.asset_type));
        attributes.insert("cloud_account_id".into(), json!(account.id));
        attributes.insert("cloud_account_name".into(), json!(account.name));

        Self {
            tenant_id: account.tenant_id.clone(),
            model_uid: instance.asset_type.model_uid(account.provider),
            asset_id: instance.asset_id.clone(),
            asset_name: instance.name.clone(),
            account_id: account.id,
            attributes,
        }
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            tenant_id: self.tenant_id.clone(),
            model_uid: self.model_uid.clone(),
            asset_id: self.asset_id.clone(),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.attributes.get("region").and_then(Value::as_str)
    }
}

/// Storage for reconciled instances, keyed by [`InstanceKey`].
///
/// Implementations must tolerate concurrent calls from different regions
/// of the same account.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert or replace by natural key; repeating a write is a no-op
    async fn upsert(&self, instance: &Instance) -> Result<()>;

    /// Asset ids stored for one account, model and region
    async fn list_asset_ids_by_region(
        &self,
        tenant_id: &str,
        model_uid: &str,
        account_id: i64,
        region: &str,
    ) -> Result<Vec<String>>;

    /// Delete the given ids in one call; returns how many were removed
    async fn delete_by_asset_ids(
        &self,
        tenant_id: &str,
        model_uid: &str,
        asset_ids: &[String],
    ) -> Result<u64>;
}

/// Read access to cloud accounts plus sync bookkeeping
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `AccountNotFound` for unknown ids
    async fn get(&self, id: i64) -> Result<CloudAccount>;

    /// Active accounts of `provider`, optionally limited to one tenant
    async fn list_active(
        &self,
        tenant_id: Option<&str>,
        provider: Provider,
    ) -> Result<Vec<CloudAccount>>;

    async fn update_sync_time(&self, id: i64, at: DateTime<Utc>, asset_count: i64) -> Result<()>;
}
