//! Priority and dependency aware work queue.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::event::QueueEvent;
use crate::graph::DependencyGraph;
use crate::item::{EnqueueOptions, Instruction, ItemStatus, Priority, QueueItem};
use crate::stats::{PendingItemInfo, QueueInfo, QueueStats, StatusCounts};

/// Mutable queue state, guarded by a single lock.
///
/// `items` is the source of truth; the per-priority buckets hold ids only
/// and may contain stale entries, which dequeue prunes lazily. Every read
/// that participates in an invariant (size, processing count, dependency
/// status) happens in the same critical section as its paired write.
struct QueueState {
    /// All items, keyed by id.
    items: HashMap<Uuid, QueueItem>,

    /// Pending ids per priority, in enqueue order.
    buckets: [VecDeque<Uuid>; 4],

    /// Unsatisfied dependency edges.
    graph: DependencyGraph,

    /// Number of items currently Processing.
    processing: usize,

    /// Accumulated Pending -> Processing latency.
    wait_total_ms: u64,
    wait_samples: u64,

    /// Accumulated Processing -> Completed duration.
    exec_total_ms: u64,
    exec_samples: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            buckets: std::array::from_fn(|_| VecDeque::new()),
            graph: DependencyGraph::new(),
            processing: 0,
            wait_total_ms: 0,
            wait_samples: 0,
            exec_total_ms: 0,
            exec_samples: 0,
        }
    }
}

/// Priority and dependency aware instruction queue.
///
/// All state transitions pass through the queue's own operations; items
/// handed out by [`dequeue`](WorkQueue::dequeue) and the query methods are
/// snapshots. One [`QueueEvent`] is broadcast per transition.
pub struct WorkQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    created_at: Instant,
}

impl WorkQueue {
    /// Create a new queue.
    pub fn new(config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            state: Mutex::new(QueueState::new()),
            events,
            created_at: Instant::now(),
            config,
        }
    }

    /// Get the queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Subscribe to transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Add an instruction to the queue.
    ///
    /// Fails with [`QueueError::QueueFull`] at capacity, and rejects unknown
    /// or cyclic dependencies, all without mutating any state.
    pub async fn enqueue(
        &self,
        instruction: Instruction,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let (id, event) = {
            let mut state = self.state.lock().await;

            if state.items.len() >= self.config.max_size {
                return Err(QueueError::QueueFull);
            }
            for dep in &options.dependencies {
                if !state.items.contains_key(dep) {
                    return Err(QueueError::DependencyNotFound(*dep));
                }
            }

            let item = QueueItem::new(instruction, options, &self.config);
            if let Some(cycle) = state.graph.would_create_cycle(item.id, &item.dependencies) {
                return Err(QueueError::DependencyCycle(cycle));
            }

            let id = item.id;
            let priority = item.priority;
            for &dep in &item.dependencies {
                // Only gate on dependencies that have not already completed.
                let satisfied = state
                    .items
                    .get(&dep)
                    .map(|d| d.status == ItemStatus::Completed)
                    .unwrap_or(false);
                if !satisfied {
                    state.graph.add_dependency(id, dep);
                }
            }

            state.buckets[priority as usize].push_back(id);
            state.items.insert(id, item);
            let queue_size = state.items.len();

            debug!("Enqueued item {} (priority: {})", id, priority);
            (
                id,
                QueueEvent::Enqueued {
                    id,
                    priority,
                    queue_size,
                },
            )
        };
        self.emit(event);
        Ok(id)
    }

    /// Take the next eligible item, transitioning it to Processing.
    ///
    /// Returns `None` when the concurrency limit is saturated or no Pending
    /// item is eligible. Eligibility is evaluated fresh on every call:
    /// highest priority first, oldest first within a priority, skipping
    /// items that are blocked on dependencies or inside their retry backoff
    /// window.
    pub async fn dequeue(&self) -> Option<QueueItem> {
        let (snapshot, event) = {
            let mut state = self.state.lock().await;
            if state.processing >= self.config.max_concurrent {
                return None;
            }
            let now = Utc::now();
            let QueueState {
                items,
                buckets,
                graph,
                processing,
                wait_total_ms,
                wait_samples,
                ..
            } = &mut *state;

            let mut chosen = None;
            for priority in Priority::ALL_DESC {
                let bucket = &mut buckets[priority as usize];
                // Prune ids whose items left Pending through cancel or clear.
                bucket.retain(|id| {
                    items
                        .get(id)
                        .is_some_and(|item| item.status == ItemStatus::Pending)
                });

                let mut best: Option<(Uuid, DateTime<Utc>)> = None;
                for id in bucket.iter() {
                    let Some(item) = items.get(id) else { continue };
                    if item.not_before.is_some_and(|gate| gate > now) {
                        continue;
                    }
                    if graph.is_blocked(*id) {
                        continue;
                    }
                    if best.map_or(true, |(_, added)| item.added_at < added) {
                        best = Some((*id, item.added_at));
                    }
                }
                if let Some((id, _)) = best {
                    bucket.retain(|x| *x != id);
                    chosen = Some(id);
                    break;
                }
            }

            let id = chosen?;
            let item = items.get_mut(&id)?;
            item.status = ItemStatus::Processing;
            item.started_at = Some(now);
            item.not_before = None;
            *processing += 1;

            let wait_ms = (now - item.added_at).num_milliseconds().max(0) as u64;
            *wait_total_ms += wait_ms;
            *wait_samples += 1;

            debug!("Dequeued item {} after {}ms wait", id, wait_ms);
            (item.clone(), QueueEvent::Dequeued { id, wait_ms })
        };
        self.emit(event);
        Some(snapshot)
    }

    /// Mark a Processing item as completed.
    ///
    /// Returns false without mutation for any other status. The `result`
    /// value is recorded into the item's metadata for audit queries; the
    /// queue does not inspect it.
    pub async fn complete(&self, id: Uuid, result: serde_json::Value) -> bool {
        let event = {
            let mut state = self.state.lock().await;
            let QueueState {
                items,
                graph,
                processing,
                exec_total_ms,
                exec_samples,
                ..
            } = &mut *state;
            let Some(item) = items.get_mut(&id) else {
                return false;
            };
            if item.status != ItemStatus::Processing {
                return false;
            }

            let now = Utc::now();
            item.status = ItemStatus::Completed;
            item.completed_at = Some(now);
            if !result.is_null() {
                match &mut item.metadata {
                    serde_json::Value::Object(map) => {
                        map.insert("result".to_string(), result);
                    }
                    other => *other = serde_json::json!({ "result": result }),
                }
            }
            let duration_ms = item
                .started_at
                .map(|started| (now - started).num_milliseconds().max(0) as u64)
                .unwrap_or(0);
            *exec_total_ms += duration_ms;
            *exec_samples += 1;
            *processing -= 1;

            let unblocked = graph.satisfy(id);
            if !unblocked.is_empty() {
                debug!("Completing item {} unblocked {} waiters", id, unblocked.len());
            }
            debug!("Completed item {} in {}ms", id, duration_ms);
            QueueEvent::Completed { id, duration_ms }
        };
        self.emit(event);
        true
    }

    /// Record a failed execution attempt for a Processing item.
    ///
    /// Consumes a retry attempt: below `max_retries` the item returns to
    /// Pending once its retry delay elapses; at the cap it fails
    /// permanently. Returns false without mutation for any other status.
    pub async fn fail(&self, id: Uuid, error: impl Into<String>) -> bool {
        let error = error.into();
        let event = {
            let mut state = self.state.lock().await;
            let QueueState {
                items,
                buckets,
                processing,
                ..
            } = &mut *state;
            let Some(item) = items.get_mut(&id) else {
                return false;
            };
            if item.status != ItemStatus::Processing {
                return false;
            }

            *processing -= 1;
            item.last_error = Some(error.clone());
            item.started_at = None;

            if item.can_retry() {
                item.retry_count += 1;
                item.status = ItemStatus::Pending;
                let delay_ms = item.retry_delay.as_millis() as u64;
                item.not_before = Some(now_plus_ms(delay_ms));
                buckets[item.priority as usize].push_back(id);
                debug!(
                    "Retrying item {} (attempt {}/{}) in {}ms",
                    id, item.retry_count, item.max_retries, delay_ms
                );
                QueueEvent::Retrying {
                    id,
                    retry_count: item.retry_count,
                    delay_ms,
                }
            } else {
                item.status = ItemStatus::Failed;
                debug!("Item {} failed permanently: {}", id, error);
                QueueEvent::Failed {
                    id,
                    error,
                    retry_count: item.retry_count,
                }
            }
        };
        self.emit(event);
        true
    }

    /// Cancel a Pending item.
    ///
    /// Processing items cannot be cancelled; returns false without mutation
    /// for any status other than Pending.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let event = {
            let mut state = self.state.lock().await;
            let QueueState { items, graph, .. } = &mut *state;
            let Some(item) = items.get_mut(&id) else {
                return false;
            };
            if item.status != ItemStatus::Pending {
                return false;
            }
            item.status = ItemStatus::Cancelled;
            graph.remove_item(id);
            debug!("Cancelled item {}", id);
            QueueEvent::Cancelled { id }
        };
        self.emit(event);
        true
    }

    /// Change a Pending item's priority.
    ///
    /// Leaves retry state and dependencies untouched; returns false for any
    /// status other than Pending.
    pub async fn reschedule(&self, id: Uuid, priority: Priority) -> bool {
        let mut state = self.state.lock().await;
        let QueueState { items, buckets, .. } = &mut *state;
        let Some(item) = items.get_mut(&id) else {
            return false;
        };
        if item.status != ItemStatus::Pending {
            return false;
        }
        if item.priority != priority {
            let old = item.priority;
            item.priority = priority;
            buckets[old as usize].retain(|x| *x != id);
            buckets[priority as usize].push_back(id);
            debug!("Rescheduled item {} from {} to {}", id, old, priority);
        }
        true
    }

    /// Remove every item regardless of status. Returns the count removed.
    pub async fn clear(&self) -> usize {
        let (count, event) = {
            let mut state = self.state.lock().await;
            let count = state.items.len();
            state.items.clear();
            for bucket in state.buckets.iter_mut() {
                bucket.clear();
            }
            state.graph.clear();
            state.processing = 0;
            info!("Cleared {} items from queue", count);
            (count, QueueEvent::Cleared { count })
        };
        self.emit(event);
        count
    }

    /// Get a snapshot of one item.
    pub async fn get_item(&self, id: Uuid) -> Option<QueueItem> {
        self.state.lock().await.items.get(&id).cloned()
    }

    /// Get snapshots of all items carrying `tag`.
    pub async fn items_by_tag(&self, tag: &str) -> Vec<QueueItem> {
        self.state
            .lock()
            .await
            .items
            .values()
            .filter(|item| item.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }

    /// Get the number of stored items (all statuses).
    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Check if the queue holds no items.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.items.is_empty()
    }

    /// Get a statistics snapshot.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for item in state.items.values() {
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Processing => counts.processing += 1,
                ItemStatus::Completed => counts.completed += 1,
                ItemStatus::Failed => counts.failed += 1,
                ItemStatus::Cancelled => counts.cancelled += 1,
            }
        }
        QueueStats {
            counts,
            total_items: state.items.len(),
            avg_wait_ms: mean(state.wait_total_ms, state.wait_samples),
            avg_execution_ms: mean(state.exec_total_ms, state.exec_samples),
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }

    /// Get an overview of pending work for dashboards.
    pub async fn queue_info(&self) -> QueueInfo {
        let state = self.state.lock().await;
        let now = Utc::now();
        let mut pending: Vec<PendingItemInfo> = state
            .items
            .values()
            .filter(|item| item.status == ItemStatus::Pending)
            .map(|item| PendingItemInfo {
                id: item.id,
                priority: item.priority,
                age_ms: (now - item.added_at).num_milliseconds().max(0) as u64,
                blocked_on: state.graph.blocking(item.id),
                tags: item.tags.clone(),
            })
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.age_ms.cmp(&a.age_ms))
        });
        QueueInfo {
            size: state.items.len(),
            max_size: self.config.max_size,
            pending,
        }
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine; transitions are not gated on observers.
        let _ = self.events.send(event);
    }
}

fn now_plus_ms(ms: u64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(ms as i64)
}

fn mean(total: u64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total as f64 / samples as f64
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
