//! Shared fixtures: registered task types, a recording listener and the
//! executor harness used by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use conductor_core::{
    ExecutionListener, ExecutorConfig, ExecutorContext, ExecutorError, InMemoryTaskStore, Result,
    StaticExecutorProvider, Task, TaskContext, TaskDescriptor, TaskExecutor, TaskRecord,
    TaskRegistry, TaskType, TelemetrySink, WorkerPool,
};

fn param_u64(params: &Value, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn param_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Subtask that sleeps for `sleepMs` and succeeds.
#[derive(Default)]
pub struct ProvisionNode {
    params: Value,
}

#[async_trait]
impl Task for ProvisionNode {
    fn task_type(&self) -> TaskType {
        TaskType::from("provision_node")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, _ctx: &TaskContext) -> Result<()> {
        let sleep_ms = param_u64(&self.params, "sleepMs", 10);
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        Ok(())
    }
}

/// Subtask that always fails.
#[derive(Default)]
pub struct FlakyNode {
    params: Value,
}

#[async_trait]
impl Task for FlakyNode {
    fn task_type(&self) -> TaskType {
        TaskType::from("flaky_node")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, _ctx: &TaskContext) -> Result<()> {
        Err(ExecutorError::TaskFailed("disk full on node".to_string()))
    }
}

/// Well-behaved long-running subtask: sleeps in `chunkMs` slices and checks
/// for abort at each wake-up, surfacing cancellation at its natural
/// suspension points.
#[derive(Default)]
pub struct DrainNode {
    params: Value,
}

#[async_trait]
impl Task for DrainNode {
    fn task_type(&self) -> TaskType {
        TaskType::from("drain_node")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let chunk_ms = param_u64(&self.params, "chunkMs", 10_000);
        let max_chunks = param_u64(&self.params, "maxChunks", 50);
        for _ in 0..max_chunks {
            tokio::time::sleep(Duration::from_millis(chunk_ms)).await;
            if ctx.abort_requested() {
                return Err(ExecutorError::Cancelled("node drain interrupted".to_string()));
            }
        }
        Ok(())
    }
}

/// Top-level task: one group of `nodeCount` provisioning subtasks. After
/// the group completes, verifies the group's completed counter covers every
/// member.
#[derive(Default)]
pub struct CreateUniverseTask {
    params: Value,
}

#[async_trait]
impl Task for CreateUniverseTask {
    fn task_type(&self) -> TaskType {
        TaskType::from("create_universe")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let node_count = param_u64(&self.params, "nodeCount", 3);
        let sleep_ms = param_u64(&self.params, "sleepMs", 20);

        let group = ctx.create_group("provision-nodes")?;
        for _ in 0..node_count {
            let mut node = ProvisionNode::default();
            node.initialize(json!({ "sleepMs": sleep_ms }))?;
            group.add_subtask(Box::new(node))?;
        }
        ctx.add_group(Arc::clone(&group)).await?;
        ctx.run_groups().await?;

        if group.completed_count() != node_count as usize {
            return Err(ExecutorError::TaskFailed(format!(
                "group wait returned early: {group}"
            )));
        }
        Ok(())
    }
}

/// Top-level task with a mixed group {ok, failing, ok}; error handling is
/// controlled by the `ignoreErrors` param.
#[derive(Default)]
pub struct RollingRestartTask {
    params: Value,
}

#[async_trait]
impl Task for RollingRestartTask {
    fn task_type(&self) -> TaskType {
        TaskType::from("rolling_restart")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let ignore_errors = param_bool(&self.params, "ignoreErrors", false);
        let group = ctx.create_group_with(
            "restart-nodes",
            conductor_core::GroupType::Configuring,
            ignore_errors,
        )?;

        let mut first = ProvisionNode::default();
        first.initialize(json!({ "sleepMs": 50 }))?;
        group.add_subtask(Box::new(first))?;

        let mut failing = FlakyNode::default();
        failing.initialize(json!({}))?;
        group.add_subtask(Box::new(failing))?;

        let mut last = ProvisionNode::default();
        last.initialize(json!({ "sleepMs": 50 }))?;
        group.add_subtask(Box::new(last))?;

        ctx.add_group(Arc::clone(&group)).await?;
        let result = ctx.run_groups().await;

        if group.completed_count() != 3 {
            return Err(ExecutorError::TaskFailed(format!(
                "group wait returned early: {group}"
            )));
        }
        result
    }
}

/// Two-phase task: a long first group followed by a quick second one. With
/// `"cooperative": true` the first phase checks for abort every 10 s;
/// otherwise it sleeps through without checkpoints and only the abort grace
/// can stop it.
#[derive(Default)]
pub struct UpgradeSoftwareTask {
    params: Value,
}

#[async_trait]
impl Task for UpgradeSoftwareTask {
    fn task_type(&self) -> TaskType {
        TaskType::from("upgrade_software")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let cooperative = param_bool(&self.params, "cooperative", true);

        let stop = ctx.create_group("stop-services")?;
        if cooperative {
            let mut node = DrainNode::default();
            node.initialize(json!({ "chunkMs": 10_000, "maxChunks": 50 }))?;
            stop.add_subtask(Box::new(node))?;
        } else {
            let mut node = ProvisionNode::default();
            node.initialize(json!({ "sleepMs": 3_600_000u64 }))?;
            stop.add_subtask(Box::new(node))?;
        }
        ctx.add_group(stop).await?;

        let start = ctx.create_group("start-services")?;
        let mut node = ProvisionNode::default();
        node.initialize(json!({ "sleepMs": 10 }))?;
        start.add_subtask(Box::new(node))?;
        ctx.add_group(start).await?;

        ctx.run_groups().await
    }
}

/// Task whose single subtask carries a one-minute time limit but sleeps for
/// five.
#[derive(Default)]
pub struct BackupUniverseTask {
    params: Value,
}

#[async_trait]
impl Task for BackupUniverseTask {
    fn task_type(&self) -> TaskType {
        TaskType::from("backup_universe")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let group = ctx.create_group("snapshot-nodes")?;
        let mut node = ProvisionNode::default();
        node.initialize(json!({ "sleepMs": 300_000u64, "timeLimitMins": 1 }))?;
        group.add_subtask(Box::new(node))?;
        ctx.add_group(group).await?;
        ctx.run_groups().await
    }
}

/// Short task used by the shutdown scenario: one group, one 2 s subtask.
#[derive(Default)]
pub struct HealthCheckTask {
    params: Value,
}

#[async_trait]
impl Task for HealthCheckTask {
    fn task_type(&self) -> TaskType {
        TaskType::from("health_check")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let group = ctx.create_group("probe-nodes")?;
        let mut node = ProvisionNode::default();
        node.initialize(json!({ "sleepMs": 2_000 }))?;
        group.add_subtask(Box::new(node))?;
        ctx.add_group(group).await?;
        ctx.run_groups().await
    }
}

/// Replays one identical phase twice with a `reset` in between.
#[derive(Default)]
pub struct RetryMigrationTask {
    params: Value,
}

#[async_trait]
impl Task for RetryMigrationTask {
    fn task_type(&self) -> TaskType {
        TaskType::from("retry_migration")
    }

    fn initialize(&mut self, params: Value) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        for _round in 0..2 {
            let group = ctx.create_group("migrate-batch")?;
            let mut node = ProvisionNode::default();
            node.initialize(json!({ "sleepMs": 20 }))?;
            group.add_subtask(Box::new(node))?;
            ctx.add_group(group).await?;
            ctx.run_groups().await?;
            ctx.reset()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerEvent {
    pub kind: &'static str,
    pub task_type: TaskType,
    pub failed: bool,
}

/// Listener recording every before/after callback.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ExecutionListener for RecordingListener {
    fn before(&self, record: &TaskRecord) -> Result<()> {
        self.events.lock().unwrap().push(ListenerEvent {
            kind: "before",
            task_type: record.task_type.clone(),
            failed: false,
        });
        Ok(())
    }

    fn after(&self, record: &TaskRecord, error: Option<&ExecutorError>) {
        self.events.lock().unwrap().push(ListenerEvent {
            kind: "after",
            task_type: record.task_type.clone(),
            failed: error.is_some(),
        });
    }
}

/// Listener whose `before` cancels everything it sees.
pub struct CancellingListener;

impl ExecutionListener for CancellingListener {
    fn before(&self, record: &TaskRecord) -> Result<()> {
        Err(ExecutorError::Cancelled(format!(
            "skipped by listener: {}",
            record.task_type
        )))
    }

    fn after(&self, _record: &TaskRecord, _error: Option<&ExecutorError>) {}
}

pub struct TestHarness {
    pub store: Arc<InMemoryTaskStore>,
    pub registry: Arc<TaskRegistry>,
    pub provider: Arc<StaticExecutorProvider>,
    pub executor: Arc<TaskExecutor>,
    pub pool: Arc<WorkerPool>,
}

pub fn harness() -> TestHarness {
    harness_with(ExecutorConfig::default(), None)
}

pub fn harness_with(
    config: ExecutorConfig,
    telemetry: Option<Arc<dyn TelemetrySink>>,
) -> TestHarness {
    let store = Arc::new(InMemoryTaskStore::new());
    let registry = Arc::new(TaskRegistry::new());
    register_task_types(&registry);
    let provider = Arc::new(StaticExecutorProvider::new(config.default_pool_capacity));

    let mut context = ExecutorContext::new(
        Arc::clone(&store) as Arc<dyn conductor_core::TaskStore>,
        Arc::clone(&provider) as Arc<dyn conductor_core::ExecutorProvider>,
        Arc::clone(&registry),
    )
    .with_config(config);
    if let Some(telemetry) = telemetry {
        context = context.with_telemetry(telemetry);
    }

    let executor = TaskExecutor::new(context);
    let pool = WorkerPool::new("test-tasks", 8);
    TestHarness {
        store,
        registry,
        provider,
        executor,
        pool,
    }
}

fn register_task_types(registry: &TaskRegistry) {
    registry.register(
        TaskType::from("create_universe"),
        TaskDescriptor::new(|| Box::new(CreateUniverseTask::default())),
    );
    registry.register(
        TaskType::from("rolling_restart"),
        TaskDescriptor::new(|| Box::new(RollingRestartTask::default())),
    );
    registry.register(
        TaskType::from("upgrade_software"),
        TaskDescriptor::new(|| Box::new(UpgradeSoftwareTask::default())).abortable(true),
    );
    registry.register(
        TaskType::from("backup_universe"),
        TaskDescriptor::new(|| Box::new(BackupUniverseTask::default())),
    );
    registry.register(
        TaskType::from("health_check"),
        TaskDescriptor::new(|| Box::new(HealthCheckTask::default())),
    );
    registry.register(
        TaskType::from("retry_migration"),
        TaskDescriptor::new(|| Box::new(RetryMigrationTask::default())).retryable(true),
    );
    registry.register(
        TaskType::from("provision_node"),
        TaskDescriptor::new(|| Box::new(ProvisionNode::default())),
    );
    registry.register(
        TaskType::from("flaky_node"),
        TaskDescriptor::new(|| Box::new(FlakyNode::default())),
    );
    registry.register(
        TaskType::from("drain_node"),
        TaskDescriptor::new(|| Box::new(DrainNode::default())).abortable(true),
    );
}

/// Sum the `_count` samples of a histogram in rendered Prometheus text,
/// keeping only lines containing every needle.
pub fn metric_count(rendered: &str, metric: &str, needles: &[&str]) -> u64 {
    let prefix = format!("{metric}_count");
    rendered
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .filter(|line| needles.iter().all(|needle| line.contains(needle)))
        .filter_map(|line| line.rsplit(' ').next())
        .filter_map(|value| value.parse::<f64>().ok())
        .map(|value| value as u64)
        .sum()
}
