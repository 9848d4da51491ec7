//! State owned by the task coordinator.
//!
//! Everything here is mutated only while the coordinator's context lock is
//! held. Nothing in this module awaits.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::models::goal::Goal;
use crate::domain::models::task::{DomainId, Task, TaskStatus};

/// Count of tasks holding a concurrency slot (assigned or running).
#[derive(Debug, Default)]
pub struct RunningCounter(AtomicUsize);

impl RunningCounter {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Increment, then compare against `max`, undoing the increment when over.
    pub fn try_acquire(&self, max: usize) -> bool {
        let next = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        if next > max {
            self.release();
            return false;
        }
        true
    }

    /// Decrement, clamped at zero. Returns false when already zero.
    pub fn release(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// One status change recorded in a task trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub status: TaskStatus,
    pub domain: DomainId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Diagnostic record kept for a recently active task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTrace {
    pub task_id: Uuid,
    pub domain: DomainId,
    pub task_type: String,
    pub correlation_id: Option<Uuid>,
    pub entries: Vec<TraceEntry>,
}

/// Bounded trace store, evicting the oldest trace first.
#[derive(Debug)]
pub struct TraceContexts {
    cap: usize,
    order: VecDeque<Uuid>,
    traces: HashMap<Uuid, TaskTrace>,
}

impl TraceContexts {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            traces: HashMap::new(),
        }
    }

    /// Open a trace for a newly submitted task.
    pub fn start(&mut self, task: &Task) {
        let trace = TaskTrace {
            task_id: task.id,
            domain: task.domain.clone(),
            task_type: task.task_type.clone(),
            correlation_id: task.correlation_id,
            entries: vec![TraceEntry {
                at: task.updated_at,
                status: task.status,
                domain: task.assigned_domain.clone(),
                note: None,
            }],
        };
        if self.traces.insert(task.id, trace).is_none() {
            self.order.push_back(task.id);
        }
        while self.traces.len() > self.cap {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.traces.remove(&oldest);
        }
    }

    /// Append the task's current status. No-op if its trace was evicted.
    pub fn record(&mut self, task: &Task, note: Option<String>) {
        if let Some(trace) = self.traces.get_mut(&task.id) {
            trace.entries.push(TraceEntry {
                at: task.updated_at,
                status: task.status,
                domain: task.assigned_domain.clone(),
                note,
            });
        }
    }

    pub fn get(&self, task_id: Uuid) -> Option<&TaskTrace> {
        self.traces.get(&task_id)
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.traces.contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub const fn cap(&self) -> usize {
        self.cap
    }
}

/// Ids of retired tasks, remembered longer than their traces or history so
/// repeat cancels and late results stay no-ops. Oldest ids fall out first.
#[derive(Debug)]
pub struct RetiredIds {
    cap: usize,
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl RetiredIds {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    pub fn insert(&mut self, task_id: Uuid) {
        if !self.ids.insert(task_id) {
            return;
        }
        self.order.push_back(task_id);
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.ids.contains(&task_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Lifetime counters behind `get_metrics`.
#[derive(Debug, Default, Clone)]
pub struct MetricCounters {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub rebalanced: u64,
    latency_total_ms: i64,
    latency_samples: u64,
}

impl MetricCounters {
    pub fn record_latency(&mut self, latency_ms: Option<i64>) {
        if let Some(ms) = latency_ms {
            self.latency_total_ms += ms;
            self.latency_samples += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0)
            .then(|| self.latency_total_ms as f64 / self.latency_samples as f64)
    }
}

/// Registry, queues and bookkeeping for every task the coordinator owns.
#[derive(Debug)]
pub struct CoordinatorContext {
    /// Tasks not yet retired.
    pub tasks: HashMap<Uuid, Task>,
    pub queues: BTreeMap<DomainId, VecDeque<Uuid>>,
    pub running_by_domain: HashMap<DomainId, usize>,
    pub tokens: HashMap<Uuid, CancellationToken>,
    pub goal_senders: HashMap<Uuid, watch::Sender<Option<Goal>>>,
    pub traces: TraceContexts,
    pub completed: VecDeque<Task>,
    completed_cap: usize,
    pub retired: RetiredIds,
    pub counters: MetricCounters,
}

impl CoordinatorContext {
    pub fn new(trace_cap: usize, completed_cap: usize, retired_cap: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            queues: BTreeMap::new(),
            running_by_domain: HashMap::new(),
            tokens: HashMap::new(),
            goal_senders: HashMap::new(),
            traces: TraceContexts::new(trace_cap),
            completed: VecDeque::new(),
            completed_cap: completed_cap.max(1),
            retired: RetiredIds::new(retired_cap),
            counters: MetricCounters::default(),
        }
    }

    pub fn queue_depth(&self, domain: &DomainId) -> usize {
        self.queues.get(domain).map_or(0, VecDeque::len)
    }

    pub fn queued_total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn running_in(&self, domain: &DomainId) -> usize {
        self.running_by_domain.get(domain).copied().unwrap_or(0)
    }

    /// Append as newest in `domain`'s queue.
    pub fn enqueue(&mut self, task_id: Uuid, domain: &DomainId) {
        self.queues
            .entry(domain.clone())
            .or_default()
            .push_back(task_id);
    }

    pub fn remove_from_queue(&mut self, task_id: Uuid, domain: &DomainId) -> bool {
        let Some(queue) = self.queues.get_mut(domain) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|id| *id == task_id) else {
            return false;
        };
        queue.remove(pos);
        true
    }

    pub fn slot_taken(&mut self, domain: &DomainId) {
        *self.running_by_domain.entry(domain.clone()).or_default() += 1;
    }

    pub fn slot_freed(&mut self, domain: &DomainId) {
        if let Some(count) = self.running_by_domain.get_mut(domain) {
            *count = count.saturating_sub(1);
        }
    }

    /// The queue head to promote next: highest priority, then oldest, then domain name.
    pub fn next_queued(&self) -> Option<(DomainId, Uuid)> {
        self.queues
            .iter()
            .filter_map(|(domain, queue)| {
                let id = *queue.front()?;
                let task = self.tasks.get(&id)?;
                Some((domain, id, task.priority, task.created_at))
            })
            .min_by(|a, b| {
                b.2.cmp(&a.2)
                    .then_with(|| a.3.cmp(&b.3))
                    .then_with(|| a.0.cmp(b.0))
            })
            .map(|(domain, id, _, _)| (domain.clone(), id))
    }

    /// Move a terminal task out of the registry into the capped history.
    pub fn retire(&mut self, task_id: Uuid) -> Option<Task> {
        let task = self.tasks.remove(&task_id)?;
        self.tokens.remove(&task_id);
        self.goal_senders.remove(&task_id);
        self.retired.insert(task_id);
        self.completed.push_back(task.clone());
        while self.completed.len() > self.completed_cap {
            self.completed.pop_front();
        }
        Some(task)
    }

    /// Whether `task_id` was retired within the remembered window.
    pub fn is_retired(&self, task_id: Uuid) -> bool {
        !self.tasks.contains_key(&task_id) && self.retired.contains(task_id)
    }

    /// Check that every queued task sits in exactly one queue, the one for its
    /// assigned domain, and that queues hold nothing else.
    pub fn verify_queue_membership(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for (domain, queue) in &self.queues {
            for id in queue {
                if !seen.insert(*id) {
                    return Err(format!("task {id} is present in more than one domain queue"));
                }
                match self.tasks.get(id) {
                    Some(task)
                        if task.status == TaskStatus::Queued && &task.assigned_domain == domain => {}
                    _ => {
                        return Err(format!(
                            "queue '{domain}' holds task {id}, which is not queued there"
                        ))
                    }
                }
            }
        }

        let queued = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .count();
        if queued != seen.len() {
            return Err(format!(
                "{queued} tasks are queued but {} are present in domain queues",
                seen.len()
            ));
        }
        Ok(())
    }
}
