//! Instruction executor core implementation.
//!
//! The executor is the driving loop of the scheduling core: a timer fires
//! poll ticks, each tick asks the queue for the next eligible item, hands
//! it to the caller-supplied [`InstructionHandler`], applies a timeout, and
//! feeds the outcome back into the queue. Exactly one execution is in
//! flight per executor; run one executor per project to get N-way
//! concurrency across projects.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flowboard_queue::{
    EnqueueOptions, Instruction, Priority, QueueEvent, QueueItem, WorkQueue,
};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::handler::{InstructionHandler, RecoverySource};
use crate::metrics::{ExecutorMetrics, ExecutorStats};
use crate::state::ExecutorState;

/// Event published by the executor.
///
/// Queue transition events are republished verbatim; the executor adds
/// poll-loop faults and periodic stats snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutorEvent {
    /// A queue transition, forwarded from the queue's own stream.
    Queue(QueueEvent),

    /// A fault the poll loop survived.
    PollError { message: String },

    /// Periodic stats snapshot.
    StatsUpdated(ExecutorStats),
}

/// The single in-flight execution.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    /// Queue item being executed.
    pub item_id: Uuid,

    /// The instruction handed to the capability.
    pub instruction: Instruction,

    /// When execution started.
    pub started_at: Instant,

    /// When the timeout forces a failure outcome.
    pub deadline: Instant,
}

/// Outcome of one handler invocation, after normalization.
enum Outcome {
    Success(Option<serde_json::Value>),
    Failure(String),
    Timeout,
}

/// Polling instruction executor.
pub struct InstructionExecutor {
    config: ExecutorConfig,
    queue: Arc<WorkQueue>,
    handler: Arc<dyn InstructionHandler>,
    recovery: Option<Arc<dyn RecoverySource>>,

    /// Current lifecycle state.
    state: AtomicU8,

    /// Running totals.
    metrics: Arc<ExecutorMetrics>,

    /// Producer id -> queue item id, for the passthrough operations.
    instruction_index: Arc<DashMap<String, Uuid>>,

    /// The single in-flight execution, if any.
    in_flight: Arc<Mutex<Option<ExecutionTask>>>,

    /// Executor event channel.
    events: broadcast::Sender<ExecutorEvent>,

    /// Shutdown signal for the background tasks.
    shutdown: Mutex<Option<watch::Sender<bool>>>,

    /// Background task handles (poll loop, event forwarder).
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InstructionExecutor {
    /// Create a new executor.
    pub fn new(
        config: ExecutorConfig,
        queue: Arc<WorkQueue>,
        handler: Arc<dyn InstructionHandler>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            config,
            queue,
            handler,
            recovery: None,
            state: AtomicU8::new(ExecutorState::Stopped as u8),
            metrics: Arc::new(ExecutorMetrics::new()),
            instruction_index: Arc::new(DashMap::new()),
            in_flight: Arc::new(Mutex::new(None)),
            events,
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Attach a recovery source, replayed during `start()`.
    pub fn with_recovery(mut self, recovery: Arc<dyn RecoverySource>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Get current state.
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ExecutorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Get the metrics.
    pub fn metrics(&self) -> &Arc<ExecutorMetrics> {
        &self.metrics
    }

    /// Get the underlying queue.
    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Subscribe to executor events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.events.subscribe()
    }

    /// Get the in-flight execution, if any.
    pub async fn in_flight(&self) -> Option<ExecutionTask> {
        self.in_flight.lock().await.clone()
    }

    /// Get a stats snapshot.
    pub async fn stats(&self) -> ExecutorStats {
        let queue_stats = self.queue.stats().await;
        self.metrics.snapshot(self.state(), queue_stats)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the executor. Idempotent while running.
    ///
    /// Runs recovery (if a source is attached), spawns the poll loop and
    /// the event forwarder, then transitions to Running. A recovery failure
    /// leaves the executor in the Error state.
    pub async fn start(self: &Arc<Self>) -> ExecutorResult<()> {
        match self.state() {
            ExecutorState::Running => return Ok(()),
            ExecutorState::Stopped | ExecutorState::Error => {}
            other => {
                return Err(ExecutorError::StartupFailed(format!(
                    "cannot start from state {other}"
                )))
            }
        }
        self.set_state(ExecutorState::Starting);
        info!("Executor starting");

        if let Some(recovery) = self.recovery.clone() {
            match recovery.load_pending().await {
                Ok(pending) => {
                    let count = pending.len();
                    for (instruction, options) in pending {
                        let source_id = instruction.source_id.clone();
                        match self.queue.enqueue(instruction, options).await {
                            Ok(id) => {
                                self.instruction_index.insert(source_id, id);
                            }
                            Err(e) => warn!("Recovery enqueue failed: {}", e),
                        }
                    }
                    if count > 0 {
                        info!("Recovered {} pending instructions", count);
                    }
                }
                Err(e) => {
                    error!("Recovery failed: {}", e);
                    self.set_state(ExecutorState::Error);
                    return Err(ExecutorError::StartupFailed(e.to_string()));
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poll = tokio::spawn(Arc::clone(self).poll_loop(shutdown_rx.clone()));
        let forwarder = tokio::spawn(
            Arc::clone(self).forward_events(self.queue.subscribe(), shutdown_rx),
        );

        *self.shutdown.lock().await = Some(shutdown_tx);
        *self.tasks.lock().await = vec![poll, forwarder];

        self.metrics.mark_start();
        self.set_state(ExecutorState::Running);
        info!("Executor started");
        Ok(())
    }

    /// Stop the executor.
    ///
    /// Signals the poll loop, then waits for it. An in-flight execution
    /// always finishes before the loop observes shutdown, so nothing is
    /// abandoned mid-flight.
    pub async fn stop(&self) -> ExecutorResult<()> {
        if self.state() == ExecutorState::Stopped {
            return Ok(());
        }
        info!("Executor stopping");
        if let Some(shutdown) = self.shutdown.lock().await.take() {
            let _ = shutdown.send(true);
        }
        for task in self.tasks.lock().await.drain(..) {
            let _ = task.await;
        }
        self.set_state(ExecutorState::Stopped);
        info!("Executor stopped");
        Ok(())
    }

    /// Pause polling without draining or clearing the queue.
    pub fn pause(&self) -> ExecutorResult<()> {
        if self.state() != ExecutorState::Running {
            return Err(ExecutorError::NotRunning);
        }
        self.set_state(ExecutorState::Pausing);
        info!("Executor pausing");
        Ok(())
    }

    /// Resume polling after a pause.
    pub fn resume(&self) -> ExecutorResult<()> {
        match self.state() {
            ExecutorState::Paused | ExecutorState::Pausing => {
                self.set_state(ExecutorState::Running);
                info!("Executor resumed");
                Ok(())
            }
            ExecutorState::Running => Ok(()),
            _ => Err(ExecutorError::NotRunning),
        }
    }

    // ========================================================================
    // Producer passthroughs
    // ========================================================================

    /// Enqueue an instruction, remembering its producer id.
    pub async fn add_instruction(
        &self,
        instruction: Instruction,
        options: EnqueueOptions,
    ) -> ExecutorResult<Uuid> {
        let source_id = instruction.source_id.clone();
        let id = self.queue.enqueue(instruction, options).await?;
        self.instruction_index.insert(source_id, id);
        Ok(id)
    }

    /// Cancel a pending instruction by its producer id.
    pub async fn remove_instruction(&self, source_id: &str) -> bool {
        let Some(entry) = self.instruction_index.get(source_id) else {
            return false;
        };
        let id = *entry;
        drop(entry);
        self.queue.cancel(id).await
    }

    /// Change a pending instruction's priority by its producer id.
    pub async fn reschedule_instruction(&self, source_id: &str, priority: Priority) -> bool {
        let Some(entry) = self.instruction_index.get(source_id) else {
            return false;
        };
        let id = *entry;
        drop(entry);
        self.queue.reschedule(id, priority).await
    }

    // ========================================================================
    // Poll loop
    // ========================================================================

    async fn poll_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_stats = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = ticker.tick() => {}
            }
            if *shutdown_rx.borrow() {
                break;
            }

            if self.state() == ExecutorState::Pausing {
                self.set_state(ExecutorState::Paused);
                info!("Executor paused");
            }
            if self.state() != ExecutorState::Running {
                continue;
            }

            self.tick().await;

            if last_stats.elapsed() >= self.config.stats_interval() {
                last_stats = Instant::now();
                self.emit(ExecutorEvent::StatsUpdated(self.stats().await));
            }
        }
        debug!("Executor poll loop exited");
    }

    /// One poll tick: dequeue, execute, resolve.
    ///
    /// Never propagates a fault; anything unexpected becomes a
    /// [`ExecutorEvent::PollError`] so the next tick always runs.
    async fn tick(&self) {
        if self.in_flight.lock().await.is_some() {
            return;
        }
        let Some(item) = self.queue.dequeue().await else {
            return;
        };

        self.metrics.record_executed();
        let started = Instant::now();
        *self.in_flight.lock().await = Some(ExecutionTask {
            item_id: item.id,
            instruction: item.instruction.clone(),
            started_at: started,
            deadline: started + self.config.execution_timeout(),
        });

        let outcome = self.run_handler(&item).await;
        self.resolve(&item, started, outcome).await;

        *self.in_flight.lock().await = None;
    }

    /// Invoke the handler inside its own task, with the timeout armed.
    ///
    /// Spawning isolates handler panics; a panic or a cancelled task is
    /// normalized to a generic failure instead of propagating.
    async fn run_handler(&self, item: &QueueItem) -> Outcome {
        let handler = Arc::clone(&self.handler);
        let instruction = item.instruction.clone();
        let handle = tokio::spawn(async move { handler.execute(&instruction).await });

        match tokio::time::timeout(self.config.execution_timeout(), handle).await {
            // Timeout expiry drops the JoinHandle: the handler task is
            // detached and may still be running. Best-effort only.
            Err(_) => Outcome::Timeout,
            Ok(Err(join_err)) if join_err.is_panic() => {
                Outcome::Failure("execution panicked".to_string())
            }
            Ok(Err(_)) => Outcome::Failure("execution task was cancelled".to_string()),
            Ok(Ok(Err(e))) => Outcome::Failure(e.to_string()),
            Ok(Ok(Ok(result))) if result.success => Outcome::Success(result.output),
            Ok(Ok(Ok(result))) => Outcome::Failure(
                result
                    .error
                    .unwrap_or_else(|| "execution reported failure".to_string()),
            ),
        }
    }

    async fn resolve(&self, item: &QueueItem, started: Instant, outcome: Outcome) {
        match outcome {
            Outcome::Success(output) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let result = output.unwrap_or(serde_json::Value::Null);
                if self.queue.complete(item.id, result).await {
                    self.metrics.record_completed(duration_ms);
                    debug!(
                        "Instruction {} completed in {}ms",
                        item.instruction.source_id, duration_ms
                    );
                } else {
                    self.poll_fault(format!("completion of item {} was not accepted", item.id));
                }
            }
            Outcome::Failure(err) => {
                error!("Instruction {} failed: {}", item.instruction.source_id, err);
                self.fail_item(item, err).await;
            }
            Outcome::Timeout => {
                self.metrics.record_timeout();
                warn!(
                    "Instruction {} timed out after {}ms",
                    item.instruction.source_id, self.config.execution_timeout_ms
                );
                let err = format!(
                    "Execution timed out after {}ms",
                    self.config.execution_timeout_ms
                );
                self.fail_item(item, err).await;
            }
        }
    }

    async fn fail_item(&self, item: &QueueItem, error: String) {
        if self.queue.fail(item.id, error).await {
            // The dequeued snapshot predates the failure: an attempt was
            // left if and only if the queue turned this into a retry.
            if item.retry_count < item.max_retries {
                self.metrics.record_retry();
            } else {
                self.metrics.record_failed();
            }
        } else {
            self.poll_fault(format!("failure of item {} was not accepted", item.id));
        }
    }

    fn poll_fault(&self, message: String) {
        self.metrics.record_poll_error();
        warn!("{}", message);
        self.emit(ExecutorEvent::PollError { message });
    }

    // ========================================================================
    // Event forwarding
    // ========================================================================

    /// Republish queue events and keep the passthrough index pruned.
    async fn forward_events(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<QueueEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                event = rx.recv() => match event {
                    Ok(event) => {
                        match &event {
                            QueueEvent::Cleared { .. } => self.instruction_index.clear(),
                            other if other.is_terminal() => {
                                if let Some(id) = other.item_id() {
                                    self.instruction_index.retain(|_, v| *v != id);
                                }
                            }
                            _ => {}
                        }
                        self.emit(ExecutorEvent::Queue(event));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event forwarder lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        debug!("Executor event forwarder exited");
    }

    fn emit(&self, event: ExecutorEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
