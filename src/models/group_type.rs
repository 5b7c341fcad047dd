use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse phase label applied by task authors to every subtask in a group.
///
/// The set is fixed; groups created without an explicit phase carry
/// `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Invalid,
    Provisioning,
    Configuring,
    Installing,
    Upgrading,
    Validating,
    Deleting,
    Finalizing,
}

impl GroupType {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

impl Default for GroupType {
    fn default() -> Self {
        Self::Invalid
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Configuring => write!(f, "configuring"),
            Self::Installing => write!(f, "installing"),
            Self::Upgrading => write!(f, "upgrading"),
            Self::Validating => write!(f, "validating"),
            Self::Deleting => write!(f, "deleting"),
            Self::Finalizing => write!(f, "finalizing"),
        }
    }
}

impl std::str::FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(Self::Invalid),
            "provisioning" => Ok(Self::Provisioning),
            "configuring" => Ok(Self::Configuring),
            "installing" => Ok(Self::Installing),
            "upgrading" => Ok(Self::Upgrading),
            "validating" => Ok(Self::Validating),
            "deleting" => Ok(Self::Deleting),
            "finalizing" => Ok(Self::Finalizing),
            _ => Err(format!("Invalid group type: {s}")),
        }
    }
}
