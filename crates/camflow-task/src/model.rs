//! Task records and their lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};
use crate::payload::{TaskOutput, TaskParams};

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Reconcile stored assets against a provider
    SyncAssets,
    /// List live assets without touching the store
    DiscoverAssets,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::SyncAssets => write!(f, "sync_assets"),
            TaskType::DiscoverAssets => write!(f, "discover_assets"),
        }
    }
}

/// Task lifecycle state.
///
/// `pending → running → {completed | failed}` and `pending → cancelled`.
/// The three right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of asynchronous work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    /// Typed parameters; the variant determines the task type
    pub params: TaskParams,

    pub status: TaskStatus,

    /// Populated on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskOutput>,

    /// Populated on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// 0-100
    pub progress: u8,

    /// Human-readable current step
    pub message: String,

    pub created_by: String,

    pub created_at: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Wall time in seconds between start and completion
    pub duration: Option<i64>,
}

impl Task {
    /// A fresh pending task with a random id
    pub fn new(params: TaskParams, created_by: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            params,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            progress: 0,
            message: String::new(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.params.task_type()
    }

    /// Move to `next`, stamping lifecycle timestamps.
    ///
    /// `started_at` is written only on entry to `running`; `completed_at`
    /// and `duration` only on entry to a terminal state. Both happen at most
    /// once because neither state can be re-entered.
    pub fn apply_status(&mut self, next: TaskStatus, message: impl Into<String>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
            self.duration = Some(
                self.started_at
                    .map(|started| (now - started).num_seconds())
                    .unwrap_or(0),
            );
        }
        self.status = next;
        self.message = message.into();
        Ok(())
    }
}

/// Query filter for task listings; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub created_by: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.task_type.is_none_or(|t| task.task_type() == t)
            && self.status.is_none_or(|s| task.status == s)
            && self
                .created_by
                .as_deref()
                .is_none_or(|who| task.created_by == who)
            && self.start_date.is_none_or(|from| task.created_at >= from)
            && self.end_date.is_none_or(|to| task.created_at <= to)
    }

    /// Filter, sort newest first and paginate. Returns the page and the
    /// number of matches before pagination.
    pub fn apply<'a, I>(&self, tasks: I) -> (Vec<Task>, usize)
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut matched: Vec<&Task> = tasks.into_iter().filter(|t| self.matches(t)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        (page, total)
    }
}
