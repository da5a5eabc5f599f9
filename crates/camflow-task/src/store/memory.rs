use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{TaskStore, replace_checked, set_progress};
use crate::error::{Result, TaskError};
use crate::model::{Task, TaskFilter, TaskStatus};

/// Process-local task store
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(TaskError::AlreadyExists(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(&task.id)
            .ok_or_else(|| TaskError::NotFound(task.id.clone()))?;
        replace_checked(stored, task)
    }

    async fn update_status(&self, id: &str, status: TaskStatus, message: &str) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        stored.apply_status(status, message)?;
        Ok(stored.clone())
    }

    async fn update_progress(&self, id: &str, progress: u8, message: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        set_progress(stored, progress, message);
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<(Vec<Task>, usize)> {
        let tasks = self.tasks.read().await;
        Ok(filter.apply(tasks.values()))
    }
}
