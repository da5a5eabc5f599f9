mod common;

use camflow_task::{
    DiscoverAssetsParams, JsonTaskStore, MemoryTaskStore, QueueConfig, Task, TaskError,
    TaskFilter, TaskOutput, TaskParams, TaskQueue, TaskStatus, TaskStore,
};
use common::{
    Behavior, FlakyTaskStore, ScriptedExecutor, init_tracing, sync_task, wait_status, wait_terminal,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

fn queue_with(executor: Arc<ScriptedExecutor>, config: QueueConfig) -> TaskQueue {
    let queue = TaskQueue::new(Arc::new(MemoryTaskStore::new()), config);
    queue.register_executor(executor);
    queue
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_task_runs_to_completion() {
    init_tracing();
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Succeed));
    let queue = queue_with(executor.clone(), QueueConfig::default());
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    let task = wait_terminal(&queue, &id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(matches!(task.result, Some(TaskOutput::SyncAssets(_))));
    assert!(task.error.is_none());
    assert_eq!(task.progress, 100);
    let started = task.started_at.unwrap();
    let completed = task.completed_at.unwrap();
    assert!(started <= completed);
    assert!(task.duration.is_some());
    assert_eq!(executor.calls(), 1);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_count_bounds_concurrency() {
    init_tracing();
    let executor =
        Arc::new(ScriptedExecutor::new(Behavior::Succeed).with_delay(Duration::from_millis(30)));
    let queue = queue_with(executor.clone(), QueueConfig::new(2, 100));
    queue.start();

    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(queue.submit(sync_task()).await.unwrap());
    }

    // stop drains the buffer before returning
    queue.stop().await;

    for id in &ids {
        let task = queue.get_task_status(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed, "task {id}");
    }
    assert_eq!(executor.calls(), 10);
    assert!(executor.max_running() <= 2);
    assert!(executor.max_running() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_task_cannot_be_cancelled() {
    init_tracing();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Semaphore::new(0));
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Gate {
        started: started_tx,
        release: release.clone(),
    }));
    let queue = queue_with(executor, QueueConfig::new(1, 10));
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();

    // 1. Wait until the worker owns the task
    assert_eq!(started_rx.recv().await.unwrap(), id);
    let running = queue.get_task_status(&id).await.unwrap();
    assert_eq!(running.status, TaskStatus::Running);

    // 2. Cancelling now is rejected
    let err = queue.cancel_task(&id).await.unwrap_err();
    assert!(matches!(
        err,
        TaskError::InvalidTransition {
            from: TaskStatus::Running,
            to: TaskStatus::Cancelled,
            ..
        }
    ));

    // 3. The task still completes normally
    release.add_permits(1);
    let task = wait_terminal(&queue, &id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_while_queued_is_skipped() {
    init_tracing();
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Succeed));
    let queue = queue_with(executor.clone(), QueueConfig::new(1, 10));

    let cancelled = queue.submit(sync_task()).await.unwrap();
    let task = queue.cancel_task(&cancelled).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.started_at.is_none());
    assert!(task.completed_at.is_some());

    let later = queue.submit(sync_task()).await.unwrap();
    queue.start();
    wait_terminal(&queue, &later).await;

    // single worker, FIFO: the cancelled task was seen first and skipped
    assert_eq!(executor.calls(), 1);
    let task = queue.get_task_status(&cancelled).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.started_at.is_none());

    assert!(matches!(
        queue.cancel_task(&cancelled).await,
        Err(TaskError::InvalidTransition { .. })
    ));

    queue.stop().await;
}

#[tokio::test]
async fn test_full_queue_rejects_without_persisting() {
    let store = Arc::new(MemoryTaskStore::new());
    let queue = TaskQueue::new(store.clone(), QueueConfig::new(1, 1));
    queue.register_executor(Arc::new(ScriptedExecutor::new(Behavior::Succeed)));

    queue.submit(sync_task()).await.unwrap();
    let err = queue.submit(sync_task()).await.unwrap_err();
    assert!(matches!(err, TaskError::QueueFull));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_submit_rejections() {
    let store = Arc::new(MemoryTaskStore::new());
    let queue = TaskQueue::new(store.clone(), QueueConfig::default());

    // no executor for the type
    let err = queue.submit(sync_task()).await.unwrap_err();
    assert!(matches!(err, TaskError::NoExecutorRegistered(_)));

    queue.register_executor(Arc::new(ScriptedExecutor::new(Behavior::Succeed)));

    // still no executor for discovery
    let discover = Task::new(
        TaskParams::DiscoverAssets(DiscoverAssetsParams {
            account_id: 1,
            region: "cn-hangzhou".into(),
            asset_types: vec![],
        }),
        "tester",
    );
    assert!(matches!(
        queue.submit(discover).await,
        Err(TaskError::NoExecutorRegistered(_))
    ));

    // only pending tasks are accepted
    let mut done = sync_task();
    done.status = TaskStatus::Completed;
    assert!(matches!(
        queue.submit(done).await,
        Err(TaskError::InvalidTransition { .. })
    ));

    assert!(store.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_after_stop_is_closed() {
    let store = Arc::new(MemoryTaskStore::new());
    let queue = TaskQueue::new(store.clone(), QueueConfig::new(1, 10));
    queue.register_executor(Arc::new(ScriptedExecutor::new(Behavior::Succeed)));
    queue.start();
    queue.stop().await;

    let err = queue.submit(sync_task()).await.unwrap_err();
    assert!(matches!(err, TaskError::QueueClosed));
    assert!(store.is_empty().await);

    // stopping twice is harmless
    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_executor_error_is_recorded() {
    init_tracing();
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Fail));
    let queue = queue_with(executor, QueueConfig::new(1, 10));
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    let task = wait_terminal(&queue, &id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error.as_deref(),
        Some("listing regions: connection refused")
    );
    assert!(task.result.is_none());
    assert!(task.completed_at.is_some());

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_executor_fails_task_and_worker_survives() {
    init_tracing();
    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let queue = TaskQueue::new(store, QueueConfig::new(1, 10));
    queue.register_executor(Arc::new(ScriptedExecutor::new(Behavior::Panic)));
    queue.start();

    let first = queue.submit(sync_task()).await.unwrap();
    let task = wait_terminal(&queue, &first).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("executor panicked: boom"));

    // the same single worker keeps serving
    queue.register_executor(Arc::new(ScriptedExecutor::new(Behavior::Succeed)));
    let second = queue.submit(sync_task()).await.unwrap();
    let task = wait_terminal(&queue, &second).await;
    assert_eq!(task.status, TaskStatus::Completed);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_executor_removed_after_submit_fails_task() {
    init_tracing();
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Succeed));
    let queue = queue_with(executor.clone(), QueueConfig::new(1, 10));

    let id = queue.submit(sync_task()).await.unwrap();
    assert!(queue.unregister_executor(camflow_task::TaskType::SyncAssets));
    queue.start();

    let task = wait_terminal(&queue, &id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(
        task.error
            .as_deref()
            .unwrap()
            .contains("no executor registered")
    );
    assert!(task.started_at.is_some());
    assert_eq!(executor.calls(), 0);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_timeout_fails_task() {
    init_tracing();
    let executor =
        Arc::new(ScriptedExecutor::new(Behavior::Succeed).with_delay(Duration::from_secs(30)));
    let config = QueueConfig::new(1, 10).with_task_timeout(Some(Duration::from_millis(50)));
    let queue = queue_with(executor, config);
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    let task = wait_terminal(&queue, &id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("timed out"));

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_is_idempotent() {
    init_tracing();
    let executor =
        Arc::new(ScriptedExecutor::new(Behavior::Succeed).with_delay(Duration::from_millis(20)));
    let queue = queue_with(executor.clone(), QueueConfig::new(1, 10));
    queue.start();
    queue.start();
    assert!(queue.is_started());

    for _ in 0..4 {
        queue.submit(sync_task()).await.unwrap();
    }
    queue.stop().await;

    assert_eq!(executor.calls(), 4);
    assert_eq!(executor.max_running(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_is_visible_while_running() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Semaphore::new(0));
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Gate {
        started: started_tx,
        release: release.clone(),
    }));
    let queue = queue_with(executor, QueueConfig::new(1, 10));
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    started_rx.recv().await.unwrap();

    let task = wait_status(&queue, &id, TaskStatus::Running).await;
    assert_eq!(task.progress, 10);
    assert_eq!(task.message, "working");

    release.add_permits(1);
    wait_terminal(&queue, &id).await;
    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_json_store_backs_queue() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonTaskStore::new(temp_dir.path()));
    let queue = TaskQueue::new(store, QueueConfig::new(2, 10));
    queue.register_executor(Arc::new(ScriptedExecutor::new(Behavior::Succeed)));
    queue.start();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(queue.submit(sync_task()).await.unwrap());
    }
    queue.stop().await;

    let reopened = JsonTaskStore::new(temp_dir.path());
    let (tasks, total) = reopened
        .list(&TaskFilter::new().with_status(TaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(total, 3);
    for task in tasks {
        assert!(ids.contains(&task.id));
        assert_eq!(task.progress, 100);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_runs_when_running_edge_is_not_saved() {
    init_tracing();
    let store = Arc::new(FlakyTaskStore::failing_running_edge(1));
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Succeed));
    let queue = TaskQueue::new(store.clone(), QueueConfig::new(1, 10));
    queue.register_executor(executor.clone());
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    queue.stop().await;

    let task = store.inner.get(&id).await.unwrap();
    assert_eq!(executor.calls(), 1);
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(matches!(task.result, Some(TaskOutput::SyncAssets(_))));
    assert!(task.started_at.is_some());
    assert!(task.completed_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminal_status_lands_when_snapshot_write_fails() {
    init_tracing();
    let store = Arc::new(FlakyTaskStore::failing_updates(1));
    let executor = Arc::new(ScriptedExecutor::new(Behavior::Succeed));
    let queue = TaskQueue::new(store.clone(), QueueConfig::new(1, 10));
    queue.register_executor(executor.clone());
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    queue.stop().await;

    let task = store.inner.get(&id).await.unwrap();
    assert_eq!(executor.calls(), 1);
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.message, "task completed");
    assert!(task.completed_at.is_some());
    assert!(task.duration.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mismatched_output_fails_task() {
    let executor = Arc::new(ScriptedExecutor::new(Behavior::WrongOutput));
    let queue = queue_with(executor, QueueConfig::new(1, 10));
    queue.start();

    let id = queue.submit(sync_task()).await.unwrap();
    let task = wait_terminal(&queue, &id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.result.is_none());
    assert_eq!(
        task.error.as_deref(),
        Some("executor returned discover_assets output for a sync_assets task")
    );
    queue.stop().await;
}
