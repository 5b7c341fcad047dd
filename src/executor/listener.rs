use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::error::Result;
use crate::models::TaskRecord;

/// Callbacks fired around every task and subtask execution.
///
/// `before` may return [`ExecutorError::Cancelled`](crate::ExecutorError::Cancelled)
/// to skip the task, transitioning it to `Aborted`. Panics from either
/// callback are caught and logged; they never re-enter the state machine.
pub trait ExecutionListener: Send + Sync {
    fn before(&self, _record: &TaskRecord) -> Result<()> {
        Ok(())
    }

    fn after(&self, record: &TaskRecord, error: Option<&crate::error::ExecutorError>);
}

pub(crate) fn publish_before(
    listener: Option<&std::sync::Arc<dyn ExecutionListener>>,
    record: &TaskRecord,
) -> Result<()> {
    let Some(listener) = listener else {
        return Ok(());
    };
    match catch_unwind(AssertUnwindSafe(|| listener.before(record))) {
        Ok(result) => result,
        Err(_) => {
            error!(task_id = %record.id, "before-task listener panicked");
            Ok(())
        }
    }
}

pub(crate) fn publish_after(
    listener: Option<&std::sync::Arc<dyn ExecutionListener>>,
    record: &TaskRecord,
    error: Option<&crate::error::ExecutorError>,
) {
    let Some(listener) = listener else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| listener.after(record, error))).is_err() {
        error!(task_id = %record.id, "after-task listener panicked");
    }
}
