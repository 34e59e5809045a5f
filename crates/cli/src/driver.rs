//! An in-process cluster for dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use berth_core::{AgentId, GoalState, Offer, OfferId, Operation, Resource, TaskId, TaskState, TaskStatus};
use berth_offer::{DriverError, SchedulerDriver};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pretends to be a cluster.
///
/// Each agent is re-offered its base capacity every cycle, together with
/// whatever was reserved on it. An offer can be accepted once, and only
/// while it belongs to the latest two rounds. Launched
/// tasks report RUNNING (or FINISHED for run-once tasks) straight away,
/// except the ones named in the failure list, whose first incarnation
/// reports FAILED.
pub struct SimulatedCluster {
    agents: Vec<Offer>,
    reserved: Mutex<HashMap<AgentId, Vec<Resource>>>,
    offers: Mutex<HashMap<OfferId, (AgentId, usize)>>,
    fail_once: Mutex<HashSet<String>>,
    statuses: mpsc::Sender<TaskStatus>,
    round: AtomicUsize,
}

impl SimulatedCluster {
    /// A cluster with one agent per template offer.
    pub fn new(agents: Vec<Offer>, statuses: mpsc::Sender<TaskStatus>) -> Self {
        Self {
            agents,
            reserved: Mutex::new(HashMap::new()),
            offers: Mutex::new(HashMap::new()),
            fail_once: Mutex::new(HashSet::new()),
            statuses,
            round: AtomicUsize::new(0),
        }
    }

    /// The first launch of each named task instance fails.
    pub fn with_failures(self, task_names: impl IntoIterator<Item = String>) -> Self {
        self.fail_once
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(task_names);
        self
    }

    /// A fresh offer per agent. Offers older than the previous round are
    /// rescinded.
    pub fn offers(&self) -> Vec<Offer> {
        let reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        let mut outstanding = self.offers.lock().unwrap_or_else(PoisonError::into_inner);
        let round = self.round.fetch_add(1, Ordering::Relaxed);
        outstanding.retain(|id, (_, issued)| {
            let keep = *issued + 1 >= round;
            if !keep {
                debug!("Rescinding offer {}", id);
            }
            keep
        });

        self.agents
            .iter()
            .map(|agent| {
                let mut offer = agent.clone();
                offer.id = OfferId::new(format!("{}-O{}", agent.id, round));
                offer
                    .resources
                    .extend(reserved.get(&agent.agent_id).cloned().unwrap_or_default());
                outstanding.insert(offer.id.clone(), (agent.agent_id.clone(), round));
                offer
            })
            .collect()
    }

    fn report(&self, task_id: &TaskId, state: TaskState) {
        debug!("Reporting {} for {}", state, task_id);
        if let Err(e) = self.statuses.try_send(TaskStatus::new(task_id.clone(), state)) {
            warn!("Dropped status {} for {}: {}", state, task_id, e);
        }
    }
}

#[async_trait]
impl SchedulerDriver for SimulatedCluster {
    async fn accept_offers(&self, offer_ids: &[OfferId], operations: &[Operation]) -> Result<(), DriverError> {
        let agent = {
            let mut outstanding = self.offers.lock().unwrap_or_else(PoisonError::into_inner);
            offer_ids
                .iter()
                .filter_map(|id| outstanding.remove(id))
                .map(|(agent, _)| agent)
                .last()
                .ok_or_else(|| DriverError::Rejected(format!("unknown offers {:?}", offer_ids)))?
        };

        for operation in operations {
            info!("{} on {}", operation.kind(), agent);
            match operation {
                Operation::Reserve { resources } => self
                    .reserved
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(agent.clone())
                    .or_default()
                    .extend(resources.iter().cloned()),
                Operation::Unreserve { resources } => {
                    if let Some(held) = self
                        .reserved
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_mut(&agent)
                    {
                        held.retain(|r| !resources.contains(r));
                    }
                }
                Operation::Launch { task_infos } => {
                    for task in task_infos {
                        let fail = self
                            .fail_once
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&task.name);
                        let state = match (fail, task.goal_state()) {
                            (true, _) => TaskState::Failed,
                            (false, Some(GoalState::Finished)) => TaskState::Finished,
                            (false, _) => TaskState::Running,
                        };
                        self.report(&task.task_id, state);
                    }
                }
            }
        }
        Ok(())
    }

    async fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError> {
        self.report(task_id, TaskState::Killed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::TaskInfo;

    fn cluster() -> (SimulatedCluster, mpsc::Receiver<TaskStatus>) {
        let (tx, rx) = mpsc::channel(16);
        let agents = vec![Offer::new("template", "agent-1", vec![Resource::scalar("cpus", 2.0)])];
        (SimulatedCluster::new(agents, tx), rx)
    }

    #[tokio::test]
    async fn test_reservations_are_offered_again() {
        let (cluster, _rx) = cluster();
        let first = cluster.offers();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].resources.len(), 1);

        let reserved = Resource::scalar("cpus", 1.0).reserved("role", "principal");
        cluster
            .accept_offers(
                &[first[0].id.clone()],
                &[Operation::Reserve {
                    resources: vec![reserved.clone()],
                }],
            )
            .await
            .unwrap();

        let second = cluster.offers();
        assert_ne!(second[0].id, first[0].id);
        assert_eq!(second[0].resources.len(), 2);
        assert_eq!(second[0].resources[1], reserved);
    }

    #[tokio::test]
    async fn test_launch_reports_status() {
        let (cluster, mut rx) = cluster();
        let cluster = cluster.with_failures(["node-0-server".to_string()]);
        let offer = cluster.offers().remove(0);
        let first = TaskInfo::new("node-0-server");
        let second = TaskInfo::new("node-0-server");
        let init = TaskInfo::new("node-0-init").with_label(berth_core::GOAL_STATE_LABEL, "FINISHED");

        cluster
            .accept_offers(
                &[offer.id],
                &[Operation::Launch {
                    task_infos: vec![first.clone(), second.clone(), init.clone()],
                }],
            )
            .await
            .unwrap();

        let states: Vec<_> = (0..3).map(|_| rx.try_recv().unwrap()).collect();
        assert_eq!(states[0].task_id, first.task_id);
        assert_eq!(states[0].state, TaskState::Failed);
        assert_eq!(states[1].state, TaskState::Running);
        assert_eq!(states[2].state, TaskState::Finished);
    }

    #[tokio::test]
    async fn test_offer_is_accepted_once() {
        let (cluster, _rx) = cluster();
        let offer = cluster.offers().remove(0);
        let launch = [Operation::Launch { task_infos: vec![] }];

        assert!(cluster.accept_offers(&[offer.id.clone()], &launch).await.is_ok());
        let result = cluster.accept_offers(&[offer.id], &launch).await;
        assert!(matches!(result, Err(DriverError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_old_offers_are_rescinded() {
        let (cluster, _rx) = cluster();
        let launch = [Operation::Launch { task_infos: vec![] }];

        let stale = cluster.offers().remove(0);
        let previous = cluster.offers().remove(0);
        for _ in 0..10 {
            cluster.offers();
        }
        assert_eq!(cluster.offers.lock().unwrap().len(), 2);

        let result = cluster.accept_offers(&[stale.id], &launch).await;
        assert!(matches!(result, Err(DriverError::Rejected(_))));
        let result = cluster.accept_offers(&[previous.id], &launch).await;
        assert!(matches!(result, Err(DriverError::Rejected(_))));

        // The round before the latest is still good.
        let older = cluster.offers().remove(0);
        cluster.offers();
        assert!(cluster.accept_offers(&[older.id], &launch).await.is_ok());
    }
}
