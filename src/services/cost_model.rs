//! Learned action costs.
//!
//! Tracks per-action success and failure counts from plan execution and
//! inflates the declared cost of unreliable actions:
//! `effective = declared * (1 + failure_rate)`. Stats persist through the
//! history store under a single key so they survive restarts.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::models::action::{Action, ActionCatalog};
use crate::domain::ports::HistoryStore;

/// History store key holding the serialized stats map.
pub const ACTION_STATS_KEY: &str = "planner.action_stats";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub successes: u64,
    pub failures: u64,
}

impl ActionStats {
    pub const fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            attempts => self.failures as f64 / attempts as f64,
        }
    }
}

pub struct CostModel {
    stats: RwLock<HashMap<String, ActionStats>>,
    store: Option<Arc<dyn HistoryStore>>,
}

impl CostModel {
    /// A model with no history and no persistence.
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Load stats from `store`, starting empty if none were saved.
    ///
    /// # Errors
    /// Returns error if the store read fails or the saved value is malformed.
    #[instrument(skip(store))]
    pub async fn load(store: Arc<dyn HistoryStore>) -> Result<Self> {
        let stats = match store.get(ACTION_STATS_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .context("Failed to decode persisted action stats")?,
            None => HashMap::new(),
        };
        debug!(actions = stats.len(), "Loaded learned action costs");
        Ok(Self {
            stats: RwLock::new(stats),
            store: Some(store),
        })
    }

    pub fn record(&self, action: &str, success: bool) {
        let mut stats = self.stats.write();
        let entry = stats.entry(action.to_string()).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    pub fn stats(&self, action: &str) -> Option<ActionStats> {
        self.stats.read().get(action).copied()
    }

    pub fn effective_cost(&self, action: &Action) -> f64 {
        let rate = self.stats(&action.name).map_or(0.0, |s| s.failure_rate());
        action.cost * (1.0 + rate)
    }

    /// Copy of `catalog` with learned costs substituted.
    pub fn apply(&self, catalog: &ActionCatalog) -> ActionCatalog {
        let costs: HashMap<String, f64> = catalog
            .actions()
            .iter()
            .map(|a| (a.name.clone(), self.effective_cost(a)))
            .collect();
        catalog.with_costs(&costs)
    }

    /// Write the current stats to the history store, if one is attached.
    ///
    /// # Errors
    /// Returns error if the store write fails.
    pub async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let value = serde_json::to_value(&*self.stats.read())?;
        store.put(ACTION_STATS_KEY, value).await
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new()
    }
}
