//! Asset types and provider-reported instances

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::account::Provider;
use crate::error::CloudError;

/// Kind of cloud resource that can be inventoried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Ecs,
    Rds,
    Redis,
    #[serde(rename = "mongodb")]
    MongoDb,
    Vpc,
    Eip,
    Nas,
    Oss,
    Kafka,
    Elasticsearch,
}

impl AssetType {
    pub const ALL: [AssetType; 10] = [
        AssetType::Ecs,
        AssetType::Rds,
        AssetType::Redis,
        AssetType::MongoDb,
        AssetType::Vpc,
        AssetType::Eip,
        AssetType::Nas,
        AssetType::Oss,
        AssetType::Kafka,
        AssetType::Elasticsearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Ecs => "ecs",
            AssetType::Rds => "rds",
            AssetType::Redis => "redis",
            AssetType::MongoDb => "mongodb",
            AssetType::Vpc => "vpc",
            AssetType::Eip => "eip",
            AssetType::Nas => "nas",
            AssetType::Oss => "oss",
            AssetType::Kafka => "kafka",
            AssetType::Elasticsearch => "elasticsearch",
        }
    }

    /// Model UID under which instances of this type are stored for a provider
    pub fn model_uid(&self, provider: Provider) -> String {
        format!("{}_{}", provider, self.as_str())
    }

    /// Members of a group name such as `database`, if `name` is a group
    fn group(name: &str) -> Option<&'static [AssetType]> {
        match name {
            "database" | "db" => Some(&[AssetType::Rds, AssetType::Redis, AssetType::MongoDb]),
            "network" | "net" => Some(&[AssetType::Vpc, AssetType::Eip]),
            "storage" => Some(&[AssetType::Nas, AssetType::Oss]),
            "middleware" | "mw" => Some(&[AssetType::Kafka, AssetType::Elasticsearch]),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssetType {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let bare = match name.as_str() {
            "cloud_vm" => "ecs",
            other => other.strip_prefix("cloud_").unwrap_or(other),
        };
        AssetType::ALL
            .into_iter()
            .find(|t| t.as_str() == bare)
            .ok_or_else(|| CloudError::UnknownAssetType(s.to_string()))
    }
}

/// Result of expanding user-supplied asset type names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSelection {
    /// Concrete types, deduplicated, in first-seen order
    pub types: Vec<AssetType>,

    /// Names that matched neither a type nor a group
    pub unknown: Vec<String>,
}

impl AssetSelection {
    /// Expand names and group aliases into concrete asset types.
    ///
    /// An empty input selects `ecs` only.
    pub fn expand<S: AsRef<str>>(names: &[S]) -> Self {
        let mut selection = AssetSelection::default();
        if names.is_empty() {
            selection.types.push(AssetType::Ecs);
            return selection;
        }

        for name in names {
            let name = name.as_ref();
            let members: Vec<AssetType> = match AssetType::group(&name.to_ascii_lowercase()) {
                Some(group) => group.to_vec(),
                None => match name.parse::<AssetType>() {
                    Ok(t) => vec![t],
                    Err(_) => {
                        selection.unknown.push(name.to_string());
                        continue;
                    }
                },
            };
            for t in members {
                if !selection.types.contains(&t) {
                    selection.types.push(t);
                }
            }
        }
        selection
    }
}

/// A region as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub local_name: String,
}

impl Region {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            local_name: String::new(),
            id,
        }
    }
}

/// One live resource as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudInstance {
    /// Provider-side identifier; the asset id in the store
    pub asset_id: String,

    /// Display name
    pub name: String,

    pub asset_type: AssetType,

    pub region: String,

    #[serde(default)]
    pub zone: String,

    #[serde(default)]
    pub status: String,

    /// Provider-specific fields (IPs, sizes, tags, ...)
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl CloudInstance {
    pub fn new(
        asset_id: impl Into<String>,
        name: impl Into<String>,
        asset_type: AssetType,
        region: impl Into<String>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            name: name.into(),
            asset_type,
            region: region.into(),
            zone: String::new(),
            status: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
