//! Durable task storage
//!
//! The queue persists every task before scheduling it and writes each
//! lifecycle edge back, so the store is the source of truth for callers
//! polling task status.

mod file;
mod memory;

pub use file::JsonTaskStore;
pub use memory::MemoryTaskStore;

use async_trait::async_trait;

use crate::error::{Result, TaskError};
use crate::model::{Task, TaskFilter, TaskStatus};

/// Persistence for task records.
///
/// Status changes are validated against the stored record atomically, so
/// a worker starting a task and a caller cancelling it cannot both win.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record; fails with `AlreadyExists` on id collision
    async fn create(&self, task: &Task) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Task>;

    /// Replace the stored record with `task`.
    ///
    /// Rejected with `InvalidTransition` when the stored status cannot move
    /// to `task.status` (keeping the same status is allowed).
    async fn update(&self, task: &Task) -> Result<()>;

    /// Move a task to `status`, stamping timestamps; returns the new record
    async fn update_status(&self, id: &str, status: TaskStatus, message: &str) -> Result<Task>;

    /// Record progress (clamped to 100) and the current step message
    async fn update_progress(&self, id: &str, progress: u8, message: &str) -> Result<()>;

    /// Matching tasks, newest first, plus the unpaginated match count
    async fn list(&self, filter: &TaskFilter) -> Result<(Vec<Task>, usize)>;
}

/// Overwrite `stored` with `incoming` if the status change is legal
fn replace_checked(stored: &mut Task, incoming: &Task) -> Result<()> {
    if stored.status != incoming.status && !stored.status.can_transition_to(incoming.status) {
        return Err(TaskError::InvalidTransition {
            id: stored.id.clone(),
            from: stored.status,
            to: incoming.status,
        });
    }
    *stored = incoming.clone();
    Ok(())
}

fn set_progress(task: &mut Task, progress: u8, message: &str) {
    task.progress = progress.min(100);
    task.message = message.to_string();
}
