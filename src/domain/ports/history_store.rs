use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::task::{DomainId, Task, TaskStatus};

/// One retired task, as appended to the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub task_id: Uuid,
    pub domain: DomainId,
    pub assigned_domain: DomainId,
    pub task_type: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

impl EpisodeRecord {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            domain: task.domain.clone(),
            assigned_domain: task.assigned_domain.clone(),
            task_type: task.task_type.clone(),
            status: task.status,
            error: task.error.clone(),
            latency_ms: task.latency_ms(),
            recorded_at: Utc::now(),
        }
    }
}

/// Port for the persistence engine behind learned costs and task history
///
/// An opaque async key-value store plus an append-only episode log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Read a value. Returns `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Append one retired task to the episode log.
    async fn append_episode(&self, episode: EpisodeRecord) -> Result<()>;
}
