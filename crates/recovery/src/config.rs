//! Recovery configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constrainer::{LaunchConstrainer, TimedLaunchConstrainer, UnconstrainedLaunchConstrainer};
use crate::monitor::{FailureMonitor, NeverFailureMonitor, TimedFailureMonitor};

/// Recovery tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Minimum seconds between permanent recoveries (0 = unconstrained)
    pub min_launch_delay_secs: u64,

    /// Seconds after which a failed task counts as permanently failed
    /// (None = only when marked by the operator)
    pub permanent_failure_timeout_secs: Option<u64>,
}

impl RecoveryConfig {
    /// The launch constrainer this configuration describes.
    pub fn launch_constrainer(&self) -> Arc<dyn LaunchConstrainer> {
        match self.min_launch_delay_secs {
            0 => Arc::new(UnconstrainedLaunchConstrainer::new()),
            secs => Arc::new(TimedLaunchConstrainer::new(Duration::from_secs(secs))),
        }
    }

    /// The failure monitor this configuration describes.
    pub fn failure_monitor(&self) -> Arc<dyn FailureMonitor> {
        match self.permanent_failure_timeout_secs {
            Some(secs) => Arc::new(TimedFailureMonitor::new(Duration::from_secs(secs))),
            None => Arc::new(NeverFailureMonitor::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::RecoveryType;
    use berth_core::{Operation, TaskInfo};

    #[test]
    fn test_defaults_are_permissive() {
        let config: RecoveryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RecoveryConfig::default());

        let constrainer = config.launch_constrainer();
        constrainer.launch_happened(&Operation::Launch { task_infos: vec![] }, RecoveryType::Permanent);
        assert!(constrainer.can_launch(RecoveryType::Permanent));
        assert!(!config.failure_monitor().has_failed(&TaskInfo::new("node-0-server")));
    }

    #[test]
    fn test_timed_settings() {
        let config: RecoveryConfig = serde_json::from_str(
            r#"{"min_launch_delay_secs": 600, "permanent_failure_timeout_secs": 0}"#,
        )
        .unwrap();

        let constrainer = config.launch_constrainer();
        constrainer.launch_happened(&Operation::Launch { task_infos: vec![] }, RecoveryType::Permanent);
        assert!(!constrainer.can_launch(RecoveryType::Permanent));
        assert!(config.failure_monitor().has_failed(&TaskInfo::new("node-0-server")));
    }
}
