//! CAMFlow asset reconciliation
//!
//! Keeps the instance store in line with what cloud providers report.
//!
//! ```text
//!  SyncAssetsExecutor / DiscoverAssetsExecutor   (camflow-task)
//!                    │
//!              ┌─────▼──────┐    AdapterFactory ──▶ CloudAdapter
//!              │ Reconciler ├──▶ (list_regions, list_instances)
//!              └─────┬──────┘
//!        per region  │  bounded fan-out
//!   list ids ─▶ RegionPlan ─▶ delete stale ─▶ upsert live
//!                    │
//!             InstanceStore / AccountStore
//! ```

pub mod diff;
pub mod error;
pub mod executor;
pub mod memory;
pub mod reconciler;
pub mod store;

pub use diff::{ChangeKind, RegionPlan};
pub use error::{Result, SyncError};
pub use executor::{DiscoverAssetsExecutor, SyncAssetsExecutor};
pub use memory::{MemoryAccountStore, MemoryInstanceStore};
pub use reconciler::{Reconciler, SyncConfig, SyncEvent, SyncObserver};
pub use store::{AccountStore, Instance, InstanceKey, InstanceStore};
