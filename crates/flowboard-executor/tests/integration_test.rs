//! End-to-end tests for the scheduling core: queue and executor together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use flowboard_executor::{
    ExecutionResult, ExecutorConfig, ExecutorResult, ExecutorState, InstructionExecutor,
    InstructionHandler,
};
use flowboard_queue::{
    EnqueueOptions, Instruction, ItemStatus, Priority, QueueConfig, WorkQueue,
};

/// Records execution order; fails each instruction listed in `flaky_once`
/// exactly once before letting it succeed.
struct ScriptedHandler {
    executed: Mutex<Vec<String>>,
    flaky_once: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    fn new(flaky_once: &[&str]) -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            flaky_once: Mutex::new(flaky_once.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl InstructionHandler for ScriptedHandler {
    async fn execute(&self, instruction: &Instruction) -> ExecutorResult<ExecutionResult> {
        self.executed
            .lock()
            .unwrap()
            .push(instruction.source_id.clone());

        let mut flaky = self.flaky_once.lock().unwrap();
        if let Some(pos) = flaky.iter().position(|s| *s == instruction.source_id) {
            flaky.remove(pos);
            return Ok(ExecutionResult::failure("transient failure"));
        }
        Ok(ExecutionResult::ok(Some(
            serde_json::json!({ "handled": instruction.source_id }),
        )))
    }
}

fn test_setup(handler: Arc<dyn InstructionHandler>) -> Arc<InstructionExecutor> {
    let queue = Arc::new(WorkQueue::new(QueueConfig::default()));
    let config = ExecutorConfig {
        poll_interval_ms: 10,
        execution_timeout_ms: 1000,
        stats_interval_ms: 60_000,
        event_buffer: 256,
    };
    Arc::new(InstructionExecutor::new(config, queue, handler))
}

async fn wait_for_status(executor: &Arc<InstructionExecutor>, id: uuid::Uuid, status: ItemStatus) {
    for _ in 0..300 {
        if executor.queue().get_item(id).await.map(|i| i.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("item {} never reached {:?}", id, status);
}

#[tokio::test]
async fn test_sprint_pipeline_end_to_end() {
    let handler = Arc::new(ScriptedHandler::new(&[]));
    let executor = test_setup(handler.clone());

    // A small sprint pipeline: plan -> implement -> review, plus an urgent
    // hotfix that must jump the line and an abandoned doc task.
    let plan = executor
        .add_instruction(
            Instruction::new("plan", serde_json::json!({"story": 12})),
            EnqueueOptions::new().with_priority(Priority::Low).with_tag("sprint-12"),
        )
        .await
        .unwrap();
    let implement = executor
        .add_instruction(
            Instruction::new("implement", serde_json::json!({"story": 12})),
            EnqueueOptions::new()
                .with_priority(Priority::High)
                .with_dependency(plan)
                .with_tag("sprint-12"),
        )
        .await
        .unwrap();
    let review = executor
        .add_instruction(
            Instruction::new("review", serde_json::json!({"story": 12})),
            EnqueueOptions::new()
                .with_priority(Priority::High)
                .with_dependency(implement)
                .with_tag("sprint-12"),
        )
        .await
        .unwrap();
    executor
        .add_instruction(
            Instruction::new("hotfix", serde_json::json!({"incident": 7})),
            EnqueueOptions::new().with_priority(Priority::Critical),
        )
        .await
        .unwrap();
    executor
        .add_instruction(
            Instruction::new("write-docs", serde_json::Value::Null),
            EnqueueOptions::new().with_priority(Priority::Low),
        )
        .await
        .unwrap();

    // The doc task is abandoned before the executor ever starts.
    assert!(executor.remove_instruction("write-docs").await);

    executor.start().await.unwrap();
    wait_for_status(&executor, review, ItemStatus::Completed).await;
    executor.stop().await.unwrap();

    let executed = handler.executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["hotfix", "plan", "implement", "review"]);

    // The pipeline items are queryable by tag, all completed.
    let sprint_items = executor.queue().items_by_tag("sprint-12").await;
    assert_eq!(sprint_items.len(), 3);
    assert!(sprint_items
        .iter()
        .all(|item| item.status == ItemStatus::Completed));

    let stats = executor.stats().await;
    assert_eq!(stats.total_completed, 4);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.queue.counts.cancelled, 1);
}

#[tokio::test]
async fn test_transient_failure_recovers_via_retry() {
    let handler = Arc::new(ScriptedHandler::new(&["deploy"]));
    let executor = test_setup(handler.clone());

    let deploy = executor
        .add_instruction(
            Instruction::new("deploy", serde_json::Value::Null),
            EnqueueOptions::new()
                .with_max_retries(2)
                .with_retry_delay(Duration::from_millis(20)),
        )
        .await
        .unwrap();

    executor.start().await.unwrap();
    wait_for_status(&executor, deploy, ItemStatus::Completed).await;
    executor.stop().await.unwrap();

    // First attempt failed, second succeeded.
    assert_eq!(*handler.executed.lock().unwrap(), vec!["deploy", "deploy"]);

    let stats = executor.stats().await;
    assert_eq!(stats.total_executed, 2);
    assert_eq!(stats.total_retries, 1);
    assert_eq!(stats.total_completed, 1);
    assert_eq!(stats.total_failed, 0);

    let item = executor.queue().get_item(deploy).await.unwrap();
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.last_error.as_deref(), Some("transient failure"));
}

#[tokio::test]
async fn test_lifecycle_round_trip() {
    let handler = Arc::new(ScriptedHandler::new(&[]));
    let executor = test_setup(handler.clone());

    executor.start().await.unwrap();
    assert_eq!(executor.state(), ExecutorState::Running);

    executor.stop().await.unwrap();
    assert_eq!(executor.state(), ExecutorState::Stopped);

    // A stopped executor can be started again and still executes.
    executor.start().await.unwrap();
    let id = executor
        .add_instruction(
            Instruction::new("after-restart", serde_json::Value::Null),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    wait_for_status(&executor, id, ItemStatus::Completed).await;
    executor.stop().await.unwrap();

    assert_eq!(*handler.executed.lock().unwrap(), vec!["after-restart"]);
}
