/// Concurrent task queue for resolution jobs.
///
/// Uses a tokio Semaphore to limit how many pipelines run at once and
/// tracks per-task metadata for status reporting.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, OwnedSemaphorePermit};
use tracing::{debug, info, warn};
use chrono::Utc;

/// Status of a tracked task in the queue.
#[derive(Debug, Clone)]
pub struct TrackedTask {
    pub task_id: String,
    pub chat_id: i64,
    /// Link being resolved.
    pub label: String,
    pub status: TaskState,
    /// Error kind for failed tasks.
    pub error_kind: Option<String>,
    pub enqueued_at: chrono::DateTime<Utc>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Queued => write!(f, "queued"),
            TaskState::Running => write!(f, "running"),
            TaskState::Done => write!(f, "done"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Main task queue with concurrency control.
pub struct TaskQueue {
    /// Semaphore to limit concurrent tasks.
    semaphore: Arc<Semaphore>,
    /// Active permits (held while task runs).
    permits: Arc<Mutex<HashMap<String, OwnedSemaphorePermit>>>,
    /// Tracked task metadata.
    tasks: Arc<Mutex<HashMap<String, TrackedTask>>>,
    max_concurrent: usize,
}

impl TaskQueue {
    /// Create a new task queue with the given concurrency limit.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            permits: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            max_concurrent,
        }
    }

    /// Enqueue a task. Returns false if already tracked.
    pub async fn enqueue(&self, task_id: &str, chat_id: i64, label: &str) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(task_id) {
            warn!("Task {} already in queue", task_id);
            return false;
        }

        tasks.insert(task_id.to_string(), TrackedTask {
            task_id: task_id.to_string(),
            chat_id,
            label: label.to_string(),
            status: TaskState::Queued,
            error_kind: None,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        });

        debug!("Task {} enqueued ({})", task_id, label);
        true
    }

    /// Acquire a concurrency permit. Waits if at capacity.
    pub async fn acquire(&self, task_id: &str) -> bool {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                warn!("Semaphore closed for task {}", task_id);
                return false;
            }
        };

        self.permits.lock().await.insert(task_id.to_string(), permit);
        if let Some(task) = self.tasks.lock().await.get_mut(task_id) {
            task.status = TaskState::Running;
            task.started_at = Some(Utc::now());
        }

        debug!("Task {} acquired slot, now running", task_id);
        true
    }

    /// Mark task as completed and release its permit.
    pub async fn complete(&self, task_id: &str) {
        if let Some(task) = self.tasks.lock().await.get_mut(task_id) {
            task.status = TaskState::Done;
            task.finished_at = Some(Utc::now());
        }
        self.permits.lock().await.remove(task_id);
        info!("Task {} completed, slot released", task_id);
    }

    /// Mark task as failed with the given error kind and release its permit.
    pub async fn fail(&self, task_id: &str, error_kind: &str) {
        if let Some(task) = self.tasks.lock().await.get_mut(task_id) {
            task.status = TaskState::Failed;
            task.error_kind = Some(error_kind.to_string());
            task.finished_at = Some(Utc::now());
        }
        self.permits.lock().await.remove(task_id);
        warn!("Task {} failed ({}), slot released", task_id, error_kind);
    }

    /// Get the current status of a task.
    pub async fn get_status(&self, task_id: &str) -> Option<TrackedTask> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// Get all tasks for a specific chat, oldest first.
    pub async fn get_user_tasks(&self, chat_id: i64) -> Vec<TrackedTask> {
        let mut tasks: Vec<TrackedTask> = self.tasks.lock().await
            .values()
            .filter(|t| t.chat_id == chat_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.enqueued_at);
        tasks
    }

    /// Get count of currently running tasks.
    pub async fn running_count(&self) -> usize {
        self.permits.lock().await.len()
    }

    /// Get count of queued (waiting) tasks.
    pub async fn queued_count(&self) -> usize {
        self.tasks.lock().await
            .values()
            .filter(|t| t.status == TaskState::Queued)
            .count()
    }

    /// Get queue statistics.
    pub async fn stats(&self) -> QueueStats {
        let tasks = self.tasks.lock().await;
        let running = self.permits.lock().await.len();
        QueueStats {
            max_concurrent: self.max_concurrent,
            running,
            queued: tasks.values().filter(|t| t.status == TaskState::Queued).count(),
            completed: tasks.values().filter(|t| t.status == TaskState::Done).count(),
            failed: tasks.values().filter(|t| t.status == TaskState::Failed).count(),
            total_tracked: tasks.len(),
        }
    }

    /// Remove completed/failed tasks older than the retention period.
    pub async fn cleanup_old(&self, max_age_secs: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, t| {
            t.status == TaskState::Queued
                || t.status == TaskState::Running
                || t.enqueued_at > cutoff
        });
        before - tasks.len()
    }
}

/// Queue statistics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub max_concurrent: usize,
    pub running: usize,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_acquire() {
        let queue = TaskQueue::new(2);
        assert!(queue.enqueue("t1", 123, "https://1024tera.com/s/a").await);
        assert!(queue.acquire("t1").await);
        assert_eq!(queue.running_count().await, 1);
        let task = queue.get_status("t1").await.unwrap();
        assert_eq!(task.status, TaskState::Running);
        assert!(task.started_at.is_some());
    }

    #[tokio::test]
    async fn test_complete_releases_slot() {
        let queue = TaskQueue::new(1);
        queue.enqueue("t1", 123, "a").await;
        queue.acquire("t1").await;
        assert_eq!(queue.running_count().await, 1);

        queue.complete("t1").await;
        assert_eq!(queue.running_count().await, 0);
        assert_eq!(queue.get_status("t1").await.unwrap().status, TaskState::Done);
    }

    #[tokio::test]
    async fn test_fail_records_kind() {
        let queue = TaskQueue::new(1);
        queue.enqueue("t1", 123, "a").await;
        queue.acquire("t1").await;
        queue.fail("t1", "no_metadata_found").await;

        let task = queue.get_status("t1").await.unwrap();
        assert_eq!(task.status, TaskState::Failed);
        assert_eq!(task.error_kind.as_deref(), Some("no_metadata_found"));
        assert_eq!(queue.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue() {
        let queue = TaskQueue::new(2);
        assert!(queue.enqueue("t1", 123, "a").await);
        assert!(!queue.enqueue("t1", 123, "a").await);
    }

    #[tokio::test]
    async fn test_stats_and_user_tasks() {
        let queue = TaskQueue::new(3);
        queue.enqueue("t1", 100, "a").await;
        queue.enqueue("t2", 100, "b").await;
        queue.enqueue("t3", 200, "c").await;
        queue.acquire("t1").await;

        let stats = queue.stats().await;
        assert_eq!(stats.running, 1);
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.max_concurrent, 3);
        assert_eq!(queue.get_user_tasks(100).await.len(), 2);
        assert_eq!(queue.queued_count().await, 2);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_active() {
        let queue = TaskQueue::new(2);
        queue.enqueue("t1", 1, "a").await;
        queue.enqueue("t2", 1, "b").await;
        queue.acquire("t2").await;
        queue.complete("t2").await;

        let removed = queue.cleanup_old(-1).await;
        assert_eq!(removed, 1);
        assert!(queue.get_status("t1").await.is_some());
        assert!(queue.get_status("t2").await.is_none());
    }
}
