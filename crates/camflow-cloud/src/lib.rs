//! CAMFlow cloud domain
//!
//! Provider-neutral types shared by the task queue and the asset
//! reconciler: accounts, regions, asset types, the instances a provider
//! reports, and the [`SyncResult`] a reconciliation pass produces.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  camflow-task                    │
//! │          (TaskQueue + executor registry)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                  camflow-sync                    │
//! │   Reconciler: regions × asset types → store      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 camflow-cloud                    │
//! │  trait CloudAdapter { list_regions, ... }        │
//! │  ProviderRegistry (per-account adapter cache)    │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │    aliyun     │ │      aws      │   ... provider SDK adapters
//! └───────────────┘ └───────────────┘
//! ```

pub mod account;
pub mod adapter;
pub mod asset;
pub mod error;
pub mod result;

// Re-exports
pub use account::{AccountConfig, AccountStatus, CloudAccount, Credentials, Provider};
pub use adapter::{AdapterCreator, AdapterFactory, CloudAdapter, ProviderRegistry};
pub use asset::{AssetSelection, AssetType, CloudInstance, Region};
pub use error::{CloudError, Result};
pub use result::{IssueScope, SyncIssue, SyncResult};
