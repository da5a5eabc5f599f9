//! Task queue error types

use crate::model::{TaskStatus, TaskType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("No executor registered for task type {0}")]
    NoExecutorRegistered(TaskType),

    #[error("Task queue is full")]
    QueueFull,

    #[error("Task queue is closed")]
    QueueClosed,

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Task store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
