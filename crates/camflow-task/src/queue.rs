//! Bounded worker-pool task queue
//!
//! Tasks are persisted to the [`TaskStore`] on submit, buffered in a
//! bounded channel and pulled by a fixed number of workers. Each worker
//! drives its task through `pending → running → completed | failed` and
//! writes every edge back to the store.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TaskError};
use crate::executor::{ExecutorRegistry, TaskContext, TaskExecutor};
use crate::model::{Task, TaskFilter, TaskStatus, TaskType};
use crate::payload::TaskOutput;
use crate::store::TaskStore;

pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Queue sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of concurrent workers
    pub worker_count: usize,
    /// Tasks that may wait in the intake buffer
    pub queue_capacity: usize,
    /// Upper bound on a single execution; `None` waits forever
    pub task_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            task_timeout: Some(DEFAULT_TASK_TIMEOUT),
        }
    }
}

impl QueueConfig {
    /// Zero values fall back to the defaults
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            worker_count: if worker_count == 0 {
                DEFAULT_WORKER_COUNT
            } else {
                worker_count
            },
            queue_capacity: if queue_capacity == 0 {
                DEFAULT_QUEUE_CAPACITY
            } else {
                queue_capacity
            },
            ..Self::default()
        }
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }
}

struct QueueInner {
    store: Arc<dyn TaskStore>,
    registry: ExecutorRegistry,
    config: QueueConfig,
}

/// Asynchronous task queue with a fixed worker pool.
///
/// `submit` may be called before `start`; tasks wait in the buffer until
/// workers exist. `stop` closes intake, lets workers drain whatever is
/// already buffered and waits for them to exit.
pub struct TaskQueue {
    inner: Arc<QueueInner>,
    intake: Mutex<Option<mpsc::Sender<Task>>>,
    receiver: Mutex<Option<mpsc::Receiver<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, config: QueueConfig) -> Self {
        let config = QueueConfig {
            task_timeout: config.task_timeout,
            ..QueueConfig::new(config.worker_count, config.queue_capacity)
        };
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        Self {
            inner: Arc::new(QueueInner {
                store,
                registry: ExecutorRegistry::new(),
                config,
            }),
            intake: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.inner.registry
    }

    pub fn register_executor(&self, executor: Arc<dyn TaskExecutor>) {
        self.inner.registry.register(executor);
    }

    pub fn unregister_executor(&self, task_type: TaskType) -> bool {
        self.inner.registry.unregister(task_type).is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spawn the worker pool on the current tokio runtime.
    ///
    /// A second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Task queue already started");
            return;
        }

        let Some(rx) = lock(&self.receiver).take() else {
            tracing::warn!("Task queue was stopped before it started");
            return;
        };
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = lock(&self.workers);
        for worker_id in 0..self.inner.config.worker_count {
            let inner = Arc::clone(&self.inner);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(worker_loop(worker_id, inner, rx)));
        }

        tracing::info!(
            workers = self.inner.config.worker_count,
            capacity = self.inner.config.queue_capacity,
            "Task queue started"
        );
    }

    /// Persist `task` and hand it to the workers.
    ///
    /// Nothing is persisted when the task is rejected: unknown type, a
    /// status other than pending, a closed queue or a full buffer.
    pub async fn submit(&self, task: Task) -> Result<String> {
        let task_type = task.task_type();
        if !self.inner.registry.contains(task_type) {
            return Err(TaskError::NoExecutorRegistered(task_type));
        }
        if task.status != TaskStatus::Pending {
            return Err(TaskError::InvalidTransition {
                id: task.id.clone(),
                from: task.status,
                to: TaskStatus::Running,
            });
        }

        let Some(sender) = lock(&self.intake).clone() else {
            return Err(TaskError::QueueClosed);
        };
        let permit = sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => TaskError::QueueFull,
            mpsc::error::TrySendError::Closed(()) => TaskError::QueueClosed,
        })?;

        self.inner.store.create(&task).await?;

        let task_id = task.id.clone();
        tracing::info!(task_id = %task_id, %task_type, "Task submitted");
        permit.send(task);
        Ok(task_id)
    }

    /// Close intake and wait for every worker to finish.
    ///
    /// Buffered tasks are still executed when workers are running. If the
    /// queue never started they stay `pending` in the store.
    pub async fn stop(&self) {
        drop(lock(&self.intake).take());
        drop(lock(&self.receiver).take());

        let workers = std::mem::take(&mut *lock(&self.workers));
        if workers.is_empty() {
            tracing::debug!("Task queue stopped with no workers");
            return;
        }

        tracing::info!(workers = workers.len(), "Stopping task queue");
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task worker exited abnormally");
            }
        }
        tracing::info!("Task queue stopped");
    }

    pub async fn get_task_status(&self, id: &str) -> Result<Task> {
        self.inner.store.get(id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<(Vec<Task>, usize)> {
        self.inner.store.list(filter).await
    }

    /// Cancel a task that has not started yet.
    ///
    /// Fails with `InvalidTransition` once a worker has picked it up.
    pub async fn cancel_task(&self, id: &str) -> Result<Task> {
        let task = self
            .inner
            .store
            .update_status(id, TaskStatus::Cancelled, "task cancelled")
            .await?;
        tracing::info!(task_id = %id, "Task cancelled");
        Ok(task)
    }
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<QueueInner>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
) {
    tracing::debug!(worker_id, "Task worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        inner.run(worker_id, task).await;
    }
    tracing::debug!(worker_id, "Task worker exited");
}

impl QueueInner {
    async fn run(&self, worker_id: usize, queued: Task) {
        let task_id = queued.id.clone();
        let task_type = queued.params.task_type();

        // The store decides: a task cancelled while buffered stays cancelled.
        let (mut task, running_saved) = match self
            .store
            .update_status(&task_id, TaskStatus::Running, "task started")
            .await
        {
            Ok(task) => (task, true),
            Err(TaskError::InvalidTransition { from, .. }) => {
                tracing::info!(worker_id, %task_id, status = %from, "Skipping task that is no longer pending");
                return;
            }
            Err(e) => {
                tracing::warn!(worker_id, %task_id, error = %e, "Failed to mark task running, continuing");
                let mut task = queued;
                if let Err(e) = task.apply_status(TaskStatus::Running, "task started") {
                    tracing::error!(worker_id, %task_id, error = %e, "Dequeued task is not pending");
                    return;
                }
                (task, false)
            }
        };
        tracing::info!(worker_id, %task_id, %task_type, "Task started");

        let outcome = match self.registry.get(task_type) {
            Some(executor) => self.execute(executor.as_ref(), &mut task).await,
            None => Err(format!("no executor registered for task type {task_type}")),
        };
        let outcome = outcome.and_then(|output| match output.task_type() {
            produced if produced == task_type => Ok(output),
            produced => Err(format!(
                "executor returned {produced} output for a {task_type} task"
            )),
        });

        let (status, message) = match outcome {
            Ok(output) => {
                task.result = Some(output);
                task.progress = 100;
                (TaskStatus::Completed, "task completed".to_string())
            }
            Err(error) => {
                let message = format!("task failed: {error}");
                task.error = Some(error);
                (TaskStatus::Failed, message)
            }
        };

        if let Err(e) = task.apply_status(status, message) {
            tracing::error!(worker_id, %task_id, error = %e, "Task left running in an unexpected state");
            return;
        }

        match self.save_outcome(worker_id, &task, running_saved).await {
            Ok(()) if status == TaskStatus::Completed => {
                tracing::info!(worker_id, %task_id, %task_type, duration_secs = ?task.duration, "Task completed");
            }
            Ok(()) => {
                tracing::warn!(
                    worker_id,
                    %task_id,
                    %task_type,
                    error = task.error.as_deref().unwrap_or_default(),
                    "Task failed"
                );
            }
            Err(e) => {
                tracing::error!(worker_id, %task_id, error = %e, "Failed to persist task outcome");
            }
        }
    }

    /// Write the terminal snapshot of `task`.
    ///
    /// When the running edge never reached the store it is replayed first.
    /// When the snapshot write fails, the terminal status alone is recorded
    /// so the task does not stay `running`.
    async fn save_outcome(&self, worker_id: usize, task: &Task, running_saved: bool) -> Result<()> {
        if !running_saved {
            match self
                .store
                .update_status(&task.id, TaskStatus::Running, "task started")
                .await
            {
                Ok(_) | Err(TaskError::InvalidTransition { .. }) => {}
                Err(e) => {
                    tracing::warn!(worker_id, task_id = %task.id, error = %e, "Failed to replay running state");
                }
            }
        }

        match self.store.update(task).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(worker_id, task_id = %task.id, error = %e, "Failed to save task snapshot, recording status only");
                self.store
                    .update_status(&task.id, task.status, &task.message)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn execute(
        &self,
        executor: &dyn TaskExecutor,
        task: &mut Task,
    ) -> std::result::Result<TaskOutput, String> {
        let mut ctx = TaskContext::new(task, self.store.as_ref());
        let run = AssertUnwindSafe(executor.execute(&mut ctx)).catch_unwind();

        let finished = match self.config.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(finished) => finished,
                Err(_) => return Err(format!("task timed out after {limit:?}")),
            },
            None => run.await,
        };

        match finished {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(panic) => Err(format!("executor panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
