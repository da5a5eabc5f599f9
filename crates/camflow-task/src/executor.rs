//! Executors and the registry that maps task types to them

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{Task, TaskType};
use crate::payload::{TaskOutput, TaskParams};
use crate::store::TaskStore;

/// Runs tasks of a single type.
///
/// Executors see the task through a [`TaskContext`], which lets them read
/// the parameters and report progress but not change the lifecycle state.
/// Returning `Err` fails the task with the error's rendered chain.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn execute(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<TaskOutput>;
}

/// The running task as seen by its executor
pub struct TaskContext<'a> {
    task: &'a mut Task,
    store: &'a dyn TaskStore,
}

impl<'a> TaskContext<'a> {
    pub fn new(task: &'a mut Task, store: &'a dyn TaskStore) -> Self {
        Self { task, store }
    }

    pub fn task(&self) -> &Task {
        self.task
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn params(&self) -> &TaskParams {
        &self.task.params
    }

    /// Record progress on the task and in the store.
    ///
    /// Store failures are logged and otherwise ignored; progress is advisory.
    pub async fn report(&mut self, progress: u8, message: impl Into<String>) {
        self.task.progress = progress.min(100);
        self.task.message = message.into();

        if let Err(e) = self
            .store
            .update_progress(&self.task.id, self.task.progress, &self.task.message)
            .await
        {
            tracing::warn!(task_id = %self.task.id, error = %e, "Failed to record progress");
        }
    }
}

/// Thread-safe map of task type to executor
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<RwLock<HashMap<TaskType, Arc<dyn TaskExecutor>>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` under its own task type, replacing any previous one
    pub fn register(&self, executor: Arc<dyn TaskExecutor>) {
        let task_type = executor.task_type();
        if write_lock(&self.executors)
            .insert(task_type, executor)
            .is_some()
        {
            tracing::info!(%task_type, "Replaced task executor");
        } else {
            tracing::info!(%task_type, "Registered task executor");
        }
    }

    pub fn unregister(&self, task_type: TaskType) -> Option<Arc<dyn TaskExecutor>> {
        write_lock(&self.executors).remove(&task_type)
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskExecutor>> {
        read_lock(&self.executors).get(&task_type).cloned()
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        read_lock(&self.executors).contains_key(&task_type)
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        read_lock(&self.executors).keys().copied().collect()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
