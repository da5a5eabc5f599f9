//! CAMFlow task execution
//!
//! A bounded worker-pool queue for long-running asset operations. Every
//! task is persisted before it is scheduled, so callers can poll its
//! status, progress and outcome through the [`TaskStore`].
//!
//! # Lifecycle
//!
//! ```text
//!             submit            worker picks up        executor returns
//!   (caller) ───────▶ pending ─────────────────▶ running ──────┬──────▶ completed
//!                        │                                     └──────▶ failed
//!                        │ cancel_task
//!                        ▼
//!                    cancelled
//! ```
//!
//! Terminal states are final. Only pending tasks can be cancelled.

pub mod error;
pub mod executor;
pub mod model;
pub mod payload;
pub mod queue;
pub mod store;

// Re-exports
pub use error::{Result, TaskError};
pub use executor::{ExecutorRegistry, TaskContext, TaskExecutor};
pub use model::{Task, TaskFilter, TaskStatus, TaskType};
pub use payload::{
    DiscoverAssetsParams, DiscoverAssetsResult, SyncAssetsParams, TaskOutput, TaskParams,
};
pub use queue::{QueueConfig, TaskQueue};
pub use store::{JsonTaskStore, MemoryTaskStore, TaskStore};
