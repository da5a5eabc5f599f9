//! JSON file task store
//!
//! Keeps every task in `.camflow/tasks.json` under a project root. Each
//! mutation rewrites the whole document after moving the previous file to
//! `tasks.json.backup`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::{TaskStore, replace_checked, set_progress};
use crate::error::{Result, TaskError};
use crate::model::{Task, TaskFilter, TaskStatus};

const DOCUMENT_VERSION: u32 = 1;
const STORE_DIR: &str = ".camflow";
const STORE_FILE: &str = "tasks.json";
const STORE_BACKUP: &str = "tasks.json.backup";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskDocument {
    version: u32,
    updated_at: DateTime<Utc>,
    tasks: HashMap<String, Task>,
}

impl Default for TaskDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            updated_at: Utc::now(),
            tasks: HashMap::new(),
        }
    }
}

/// Task store persisted as a single JSON document
pub struct JsonTaskStore {
    root: PathBuf,
    /// Loaded lazily on first access; also serializes writers
    cache: Mutex<Option<TaskDocument>>,
}

impl JsonTaskStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().to_path_buf(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(STORE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(STORE_BACKUP)
    }

    async fn load(&self) -> Result<TaskDocument> {
        let path = self.path();
        if !fs::try_exists(&path).await? {
            tracing::debug!(path = %path.display(), "Task file not found, starting empty");
            return Ok(TaskDocument::default());
        }

        let content = fs::read_to_string(&path).await?;
        let doc: TaskDocument = serde_json::from_str(&content)?;
        if doc.version > DOCUMENT_VERSION {
            return Err(TaskError::Store(format!(
                "Task file version {} is newer than supported version {}",
                doc.version, DOCUMENT_VERSION
            )));
        }

        tracing::debug!(count = doc.tasks.len(), "Loaded task file");
        Ok(doc)
    }

    async fn save(&self, doc: &TaskDocument) -> Result<()> {
        let dir = self.root.join(STORE_DIR);
        fs::create_dir_all(&dir).await?;

        let path = self.path();
        if fs::try_exists(&path).await? {
            fs::rename(&path, self.backup_path()).await?;
        }

        let content = serde_json::to_string_pretty(doc)?;
        fs::write(&path, content).await?;
        tracing::trace!(count = doc.tasks.len(), "Saved task file");
        Ok(())
    }

    /// Run `f` against the current document and persist the result.
    ///
    /// The cached copy is only replaced once the write succeeds.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TaskDocument) -> Result<T> + Send,
        T: Send,
    {
        let mut cache = self.cache.lock().await;
        let mut doc = match cache.as_ref() {
            Some(doc) => doc.clone(),
            None => self.load().await?,
        };

        let out = f(&mut doc)?;
        doc.updated_at = Utc::now();
        self.save(&doc).await?;
        *cache = Some(doc);
        Ok(out)
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TaskDocument) -> T + Send,
        T: Send,
    {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        match cache.as_ref() {
            Some(doc) => Ok(f(doc)),
            None => Err(TaskError::Store("task cache unavailable".into())),
        }
    }
}

fn entry<'a>(doc: &'a mut TaskDocument, id: &str) -> Result<&'a mut Task> {
    doc.tasks
        .get_mut(id)
        .ok_or_else(|| TaskError::NotFound(id.to_string()))
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn create(&self, task: &Task) -> Result<()> {
        self.mutate(|doc| {
            if doc.tasks.contains_key(&task.id) {
                return Err(TaskError::AlreadyExists(task.id.clone()));
            }
            doc.tasks.insert(task.id.clone(), task.clone());
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Task> {
        self.read(|doc| doc.tasks.get(id).cloned())
            .await?
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    async fn update(&self, task: &Task) -> Result<()> {
        self.mutate(|doc| replace_checked(entry(doc, &task.id)?, task))
            .await
    }

    async fn update_status(&self, id: &str, status: TaskStatus, message: &str) -> Result<Task> {
        self.mutate(|doc| {
            let stored = entry(doc, id)?;
            stored.apply_status(status, message)?;
            Ok(stored.clone())
        })
        .await
    }

    async fn update_progress(&self, id: &str, progress: u8, message: &str) -> Result<()> {
        self.mutate(|doc| {
            set_progress(entry(doc, id)?, progress, message);
            Ok(())
        })
        .await
    }

    async fn list(&self, filter: &TaskFilter) -> Result<(Vec<Task>, usize)> {
        self.read(|doc| filter.apply(doc.tasks.values())).await
    }
}
