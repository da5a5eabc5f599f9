//! Cloud accounts and their credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::CloudError;

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Aliyun,
    Aws,
    Azure,
    Tencent,
    Huawei,
    Volcano,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aliyun => "aliyun",
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Tencent => "tencent",
            Provider::Huawei => "huawei",
            Provider::Volcano => "volcano",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aliyun" => Ok(Provider::Aliyun),
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "tencent" => Ok(Provider::Tencent),
            "huawei" => Ok(Provider::Huawei),
            // volcengine is the product name of the same cloud
            "volcano" | "volcengine" => Ok(Provider::Volcano),
            other => Err(CloudError::ProviderNotSupported(other.to_string())),
        }
    }
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Disabled,
    Error,
}

/// Access key pair used by adapters
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_key_id.is_empty() && !self.access_key_secret.is_empty()
    }
}

// The secret must never reach logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .finish()
    }
}

/// Per-account sync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Region allow-list; empty means every region the provider reports
    #[serde(default)]
    pub supported_regions: Vec<String>,

    /// Whether scheduled sync is enabled for this account
    #[serde(default)]
    pub enable_auto_sync: bool,

    /// Scheduled sync interval in minutes
    #[serde(default)]
    pub sync_interval_minutes: u32,
}

/// A cloud account owned by a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAccount {
    pub id: i64,
    pub name: String,
    pub provider: Provider,
    pub tenant_id: String,
    #[serde(default)]
    pub status: AccountStatus,
    pub credentials: Credentials,
    #[serde(default)]
    pub config: AccountConfig,
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub asset_count: i64,
}

impl CloudAccount {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        provider: Provider,
        tenant_id: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            provider,
            tenant_id: tenant_id.into(),
            status: AccountStatus::Active,
            credentials,
            config: AccountConfig::default(),
            last_sync_time: None,
            asset_count: 0,
        }
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supported_regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Intersect provider-reported regions with the account allow-list and
    /// an optional caller-supplied restriction. Provider order is preserved.
    pub fn filter_regions(&self, available: Vec<String>, requested: &[String]) -> Vec<String> {
        let allowed: HashSet<&str> = self
            .config
            .supported_regions
            .iter()
            .map(String::as_str)
            .collect();
        let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();

        available
            .into_iter()
            .filter(|r| allowed.is_empty() || allowed.contains(r.as_str()))
            .filter(|r| requested.is_empty() || requested.contains(r.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("aliyun".parse::<Provider>().unwrap(), Provider::Aliyun);
        assert_eq!("AWS".parse::<Provider>().unwrap(), Provider::Aws);
        assert_eq!("volcengine".parse::<Provider>().unwrap(), Provider::Volcano);
        assert!("gcp".parse::<Provider>().is_err());
    }

    #[test]
    fn test_filter_regions_without_restrictions() {
        let account =
            CloudAccount::new(1, "prod", Provider::Aliyun, "t1", Credentials::default());
        let result = account.filter_regions(regions(&["r1", "r2"]), &[]);
        assert_eq!(result, regions(&["r1", "r2"]));
    }

    #[test]
    fn test_filter_regions_intersects_allow_list_and_request() {
        let account = CloudAccount::new(1, "prod", Provider::Aliyun, "t1", Credentials::default())
            .with_regions(["r1", "r2", "r3"]);

        let result = account.filter_regions(regions(&["r1", "r2", "r3", "r4"]), &[]);
        assert_eq!(result, regions(&["r1", "r2", "r3"]));

        let result =
            account.filter_regions(regions(&["r1", "r2", "r3", "r4"]), &regions(&["r2", "r4"]));
        assert_eq!(result, regions(&["r2"]));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new("AKID", "very-secret");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("AKID"));
        assert!(!printed.contains("very-secret"));
    }
}
