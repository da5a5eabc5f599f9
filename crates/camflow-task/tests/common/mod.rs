use async_trait::async_trait;
use camflow_cloud::SyncResult;
use camflow_task::{
    DiscoverAssetsResult, MemoryTaskStore, SyncAssetsParams, Task, TaskContext, TaskError,
    TaskExecutor, TaskFilter, TaskOutput, TaskParams, TaskQueue, TaskStatus, TaskStore, TaskType,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn sync_task() -> Task {
    Task::new(
        TaskParams::SyncAssets(SyncAssetsParams::for_account(1)),
        "tester",
    )
}

pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Succeed with an output belonging to another task type
    WrongOutput,
    /// Announce the task id, then wait for a permit before finishing
    Gate {
        started: mpsc::UnboundedSender<String>,
        release: Arc<Semaphore>,
    },
}

/// Test executor that counts calls and tracks how many runs overlap
pub struct ScriptedExecutor {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::SyncAssets
    }

    async fn execute(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<TaskOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        ctx.report(10, "working").await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = match &self.behavior {
            Behavior::Succeed => Ok(TaskOutput::SyncAssets(SyncResult::default())),
            Behavior::Fail => Err(anyhow::anyhow!("connection refused").context("listing regions")),
            Behavior::WrongOutput => Ok(TaskOutput::DiscoverAssets(DiscoverAssetsResult::default())),
            Behavior::Panic => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("boom");
            }
            Behavior::Gate { started, release } => {
                let _ = started.send(ctx.id().to_string());
                release.acquire().await?.forget();
                Ok(TaskOutput::SyncAssets(SyncResult::default()))
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Poll until the task reaches a terminal state
pub async fn wait_terminal(queue: &TaskQueue, id: &str) -> Task {
    let poll = async {
        loop {
            let task = queue.get_task_status(id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("task {id} did not finish"))
}

#[allow(dead_code)]
pub async fn wait_status(queue: &TaskQueue, id: &str, status: TaskStatus) -> Task {
    let poll = async {
        loop {
            let task = queue.get_task_status(id).await.unwrap();
            if task.status == status {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("task {id} never reached {status}"))
}

/// Memory store whose next few writes fail with a transient error
#[derive(Default)]
pub struct FlakyTaskStore {
    pub inner: MemoryTaskStore,
    running_failures: AtomicUsize,
    update_failures: AtomicUsize,
}

impl FlakyTaskStore {
    pub fn failing_running_edge(times: usize) -> Self {
        let store = Self::default();
        store.running_failures.store(times, Ordering::SeqCst);
        store
    }

    pub fn failing_updates(times: usize) -> Self {
        let store = Self::default();
        store.update_failures.store(times, Ordering::SeqCst);
        store
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn create(&self, task: &Task) -> camflow_task::Result<()> {
        self.inner.create(task).await
    }

    async fn get(&self, id: &str) -> camflow_task::Result<Task> {
        self.inner.get(id).await
    }

    async fn update(&self, task: &Task) -> camflow_task::Result<()> {
        if Self::take_failure(&self.update_failures) {
            return Err(TaskError::Store("disk full".into()));
        }
        self.inner.update(task).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        message: &str,
    ) -> camflow_task::Result<Task> {
        if status == TaskStatus::Running && Self::take_failure(&self.running_failures) {
            return Err(TaskError::Store("connection reset".into()));
        }
        self.inner.update_status(id, status, message).await
    }

    async fn update_progress(&self, id: &str, progress: u8, message: &str) -> camflow_task::Result<()> {
        self.inner.update_progress(id, progress, message).await
    }

    async fn list(&self, filter: &TaskFilter) -> camflow_task::Result<(Vec<Task>, usize)> {
        self.inner.list(filter).await
    }
}
