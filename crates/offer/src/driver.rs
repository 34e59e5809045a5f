//! Scheduler driver: the connection to the cluster.

use async_trait::async_trait;
use berth_core::{OfferId, Operation, TaskId};

use crate::error::DriverError;

/// Calls the scheduler makes into the cluster.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Accept offers, running `operations` against them.
    async fn accept_offers(
        &self,
        offer_ids: &[OfferId],
        operations: &[Operation],
    ) -> Result<(), DriverError>;

    /// Ask the cluster to kill a task.
    async fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError>;
}
