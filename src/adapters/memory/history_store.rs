use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ports::{EpisodeRecord, HistoryStore};

/// Process-local history store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
    episodes: RwLock<Vec<EpisodeRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every episode appended so far, oldest first.
    pub async fn episodes(&self) -> Vec<EpisodeRecord> {
        self.episodes.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn append_episode(&self, episode: EpisodeRecord) -> Result<()> {
        self.episodes.write().await.push(episode);
        Ok(())
    }
}
