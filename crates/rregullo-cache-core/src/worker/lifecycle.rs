use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Install event pending or running.
    #[default]
    Installing,
    /// Installed, waiting for the previous version to release its pages.
    Installed,
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed or a newer version took over.
    Redundant,
}

impl WorkerState {
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Redundant)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, WorkerState::Installed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}
