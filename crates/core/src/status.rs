//! Status of plan elements.

use serde::{Deserialize, Serialize};

/// Status of a step, phase or plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Waiting to be worked on
    #[default]
    Pending,
    /// An offer cycle was attempted but nothing launched
    Prepared,
    /// Tasks launched, not yet at their goal
    Starting,
    /// Done
    Complete,
    /// Could not be constructed
    Error,
}

impl Status {
    /// Pending or prepared: eligible for another offer attempt.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::Prepared)
    }

    /// Prepared or starting: work is in flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Prepared | Self::Starting)
    }

    /// Complete.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Prepared => "PREPARED",
            Self::Starting => "STARTING",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}
