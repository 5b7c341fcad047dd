//! Task duration telemetry.
//!
//! Two duration distributions are tracked per task type: time spent waiting
//! between scheduling and execution, and execution time labelled by the
//! terminal result. The Prometheus implementation exposes both as
//! histograms; p50/p90 quantiles are derived on the scrape side.

use prometheus::{HistogramOpts, HistogramVec, Registry};
use std::sync::Arc;

use crate::models::{TaskState, TaskType};

pub const TASK_WAITING_SEC_METRIC: &str = "task_waiting_seconds";
pub const TASK_EXECUTION_SEC_METRIC: &str = "task_execution_seconds";

/// Sink for task duration observations.
pub trait TelemetrySink: Send + Sync {
    /// Duration between task scheduling and execution start.
    fn observe_wait(&self, task_type: &TaskType, seconds: f64);

    /// Duration of task execution, labelled with the terminal state.
    fn observe_execution(&self, task_type: &TaskType, result: TaskState, seconds: f64);
}

/// Discards all observations.
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn observe_wait(&self, _task_type: &TaskType, _seconds: f64) {}

    fn observe_execution(&self, _task_type: &TaskType, _result: TaskState, _seconds: f64) {}
}

/// Prometheus-backed [`TelemetrySink`].
pub struct PrometheusTelemetry {
    registry: Arc<Registry>,
    waiting: HistogramVec,
    execution: HistogramVec,
}

/// Bucket boundaries spanning sub-second submissions to multi-hour upgrades.
const DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0, 14400.0,
];

impl PrometheusTelemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let waiting = HistogramVec::new(
            HistogramOpts::new(
                TASK_WAITING_SEC_METRIC,
                "Duration between task creation and execution",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["task_type"],
        )?;

        let execution = HistogramVec::new(
            HistogramOpts::new(TASK_EXECUTION_SEC_METRIC, "Duration of task execution")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["task_type", "result"],
        )?;

        registry.register(Box::new(waiting.clone()))?;
        registry.register(Box::new(execution.clone()))?;

        Ok(Self {
            registry,
            waiting,
            execution,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render_metrics(&self) -> Result<String, Box<dyn std::error::Error>> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}

impl TelemetrySink for PrometheusTelemetry {
    fn observe_wait(&self, task_type: &TaskType, seconds: f64) {
        self.waiting
            .with_label_values(&[task_type.as_str()])
            .observe(seconds);
    }

    fn observe_execution(&self, task_type: &TaskType, result: TaskState, seconds: f64) {
        self.execution
            .with_label_values(&[task_type.as_str(), &result.to_string()])
            .observe(seconds);
    }
}

impl Default for PrometheusTelemetry {
    fn default() -> Self {
        Self::new().expect("failed to create default telemetry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_show_up_in_rendered_metrics() {
        let telemetry = PrometheusTelemetry::new().unwrap();
        let task_type = TaskType::from("create_universe");

        telemetry.observe_wait(&task_type, 0.25);
        telemetry.observe_execution(&task_type, TaskState::Success, 12.5);
        telemetry.observe_execution(&task_type, TaskState::Failure, 3.0);

        let rendered = telemetry.render_metrics().unwrap();
        assert!(rendered.contains(TASK_WAITING_SEC_METRIC));
        assert!(rendered.contains(TASK_EXECUTION_SEC_METRIC));
        assert!(rendered.contains("result=\"success\""));
        assert!(rendered.contains("result=\"failure\""));
    }

    #[test]
    fn noop_sink_accepts_observations() {
        let sink = NoopTelemetry;
        sink.observe_wait(&TaskType::from("t"), 1.0);
        sink.observe_execution(&TaskType::from("t"), TaskState::Success, 1.0);
    }
}
