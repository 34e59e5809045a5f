//! Scheduler configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use berth_plan::CoordinatorConfig;
use berth_recovery::RecoveryConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`SchedulerConfig::state_dir`].
pub const STATE_DIR_ENV: &str = "BERTH_STATE_DIR";

/// Everything the `berth` binary can be configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Recovery tuning
    pub recovery: RecoveryConfig,
    /// Offer-cycle loop settings
    pub coordinator: CoordinatorConfig,
    /// Root of the JSON state store (None = in-memory)
    pub state_dir: Option<PathBuf>,
}

impl SchedulerConfig {
    /// Load from `path` if given, then apply environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config.with_state_dir_override(std::env::var(STATE_DIR_ENV).ok()))
    }

    /// Replace the state directory when `value` is set and non-empty.
    pub fn with_state_dir_override(mut self, value: Option<String>) -> Self {
        if let Some(dir) = value.filter(|v| !v.is_empty()) {
            self.state_dir = Some(PathBuf::from(dir));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_plan::StrategyKind;

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("berth.json");
        tokio::fs::write(
            &path,
            r#"{
                "recovery": {"min_launch_delay_secs": 30},
                "coordinator": {"deploy_strategy": "parallel"},
                "state_dir": "/var/lib/berth"
            }"#,
        )
        .await
        .unwrap();

        let config = SchedulerConfig::load(Some(path.as_path())).await.unwrap();
        assert_eq!(config.recovery.min_launch_delay_secs, 30);
        assert_eq!(config.recovery.permanent_failure_timeout_secs, None);
        assert_eq!(config.coordinator.deploy_strategy, StrategyKind::Parallel);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(SchedulerConfig::load(Some(missing.as_path())).await.is_err());
    }

    #[test]
    fn test_state_dir_override() {
        let config = SchedulerConfig::default().with_state_dir_override(Some("/tmp/berth".into()));
        assert_eq!(config.state_dir, Some(PathBuf::from("/tmp/berth")));

        let config = config.with_state_dir_override(Some(String::new()));
        assert_eq!(config.state_dir, Some(PathBuf::from("/tmp/berth")));

        assert_eq!(SchedulerConfig::default().with_state_dir_override(None).state_dir, None);
    }
}
