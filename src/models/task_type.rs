use std::fmt;

use serde::{Deserialize, Serialize};

/// Registered task-type tag, e.g. `create_universe` or `upgrade_software`.
///
/// Tags are opaque to the executor; the [`TaskRegistry`](crate::registry::TaskRegistry)
/// maps them to factories and capability flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskType {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for TaskType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
