//! Rate limits on recovery launches.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use berth_core::Operation;
use tracing::{debug, info};

use crate::step::RecoveryType;

/// Decides whether a recovery may launch now.
pub trait LaunchConstrainer: Send + Sync {
    /// Record that a recovery launch happened.
    fn launch_happened(&self, operation: &Operation, recovery_type: RecoveryType);

    /// Whether a recovery of this type may launch now.
    fn can_launch(&self, recovery_type: RecoveryType) -> bool;
}

/// Never holds a launch back.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconstrainedLaunchConstrainer;

impl UnconstrainedLaunchConstrainer {
    /// Create an unconstrained constrainer.
    pub fn new() -> Self {
        Self
    }
}

impl LaunchConstrainer for UnconstrainedLaunchConstrainer {
    fn launch_happened(&self, _operation: &Operation, _recovery_type: RecoveryType) {}

    fn can_launch(&self, _recovery_type: RecoveryType) -> bool {
        true
    }
}

/// Spaces permanent recoveries at least `min_delay` apart.
///
/// Transient recoveries are never delayed.
#[derive(Debug)]
pub struct TimedLaunchConstrainer {
    min_delay: Duration,
    last_permanent_launch: Mutex<Option<Instant>>,
}

impl TimedLaunchConstrainer {
    /// Create a constrainer with the given spacing.
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_permanent_launch: Mutex::new(None),
        }
    }

    /// Minimum spacing between permanent launches.
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

impl LaunchConstrainer for TimedLaunchConstrainer {
    fn launch_happened(&self, operation: &Operation, recovery_type: RecoveryType) {
        if recovery_type != RecoveryType::Permanent {
            return;
        }
        info!("Permanent recovery launched ({})", operation.kind());
        *self
            .last_permanent_launch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn can_launch(&self, recovery_type: RecoveryType) -> bool {
        if recovery_type != RecoveryType::Permanent {
            return true;
        }
        let last = *self
            .last_permanent_launch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match last {
            Some(at) if at.elapsed() < self.min_delay => {
                debug!(
                    "Permanent recovery held back, {:?} left",
                    self.min_delay.saturating_sub(at.elapsed())
                );
                false
            }
            _ => true,
        }
    }
}
