use std::time::Duration;

use crate::error::{ExecutorError, Result};

/// How long a subtask future is polled before re-checking time limits and
/// abort status.
pub const TASK_SPIN_WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// Default wait for subtasks to complete after an abort signal before they
/// are forcibly cancelled.
pub const DEFAULT_ABORT_TASK_GRACE: Duration = Duration::from_secs(60);

/// Default timeout handed to `shutdown` by the process teardown hook.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(300);

/// Runtime configuration for the task executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Host identifier recorded as the owner of every task this process runs.
    pub owner: String,
    /// Poll interval of the round-robin subtask wait loop.
    pub spin_interval: Duration,
    /// Grace period between the abort signal and forced cancellation of
    /// still-running subtasks.
    pub abort_grace: Duration,
    /// When set, executor shutdown cancels in-flight subtasks regardless of
    /// their abortable marker.
    pub skip_subtask_abortable_check: bool,
    /// Capacity of worker pools created on demand by the default provider.
    pub default_pool_capacity: usize,
    /// Timeout used by the installed shutdown hook.
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            spin_interval: TASK_SPIN_WAIT_INTERVAL,
            abort_grace: DEFAULT_ABORT_TASK_GRACE,
            skip_subtask_abortable_check: true,
            default_pool_capacity: 16,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    /// Build a configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(owner) = std::env::var("CONDUCTOR_OWNER") {
            config.owner = owner;
        }

        if let Ok(secs) = std::env::var("CONDUCTOR_ABORT_GRACE_SECS") {
            config.abort_grace = Duration::from_secs(parse_var("CONDUCTOR_ABORT_GRACE_SECS", &secs)?);
        }

        if let Ok(secs) = std::env::var("CONDUCTOR_SPIN_INTERVAL_SECS") {
            config.spin_interval =
                Duration::from_secs(parse_var("CONDUCTOR_SPIN_INTERVAL_SECS", &secs)?);
        }

        if let Ok(capacity) = std::env::var("CONDUCTOR_POOL_CAPACITY") {
            config.default_pool_capacity = parse_var("CONDUCTOR_POOL_CAPACITY", &capacity)?;
        }

        if let Ok(flag) = std::env::var("CONDUCTOR_SKIP_SUBTASK_ABORTABLE_CHECK") {
            config.skip_subtask_abortable_check = parse_var("CONDUCTOR_SKIP_SUBTASK_ABORTABLE_CHECK", &flag)?;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ExecutorError::Config(format!("invalid {name}={raw}: {e}")))
}

fn default_owner() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_named_constants() {
        let config = ExecutorConfig::default();
        assert_eq!(config.spin_interval, TASK_SPIN_WAIT_INTERVAL);
        assert_eq!(config.abort_grace, DEFAULT_ABORT_TASK_GRACE);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert!(config.default_pool_capacity > 0);
    }

    #[test]
    fn parse_var_reports_the_offending_value() {
        let err = parse_var::<u64>("CONDUCTOR_ABORT_GRACE_SECS", "ninety").unwrap_err();
        assert!(matches!(err, ExecutorError::Config(msg) if msg.contains("ninety")));
    }
}
