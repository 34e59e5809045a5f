//! Offer recommendations: an operation to perform against a specific offer.

use berth_core::{AgentId, Offer, OfferId, Operation, Resource, TaskId, TaskInfo};

/// An operation recommended against an offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRecommendation {
    /// Offer the operation runs against
    pub offer_id: OfferId,
    /// Agent owning the offer
    pub agent_id: AgentId,
    /// The operation
    pub operation: Operation,
    /// For launches, the task as it should be recorded (id intact)
    pub task_info: Option<TaskInfo>,
}

impl OfferRecommendation {
    /// Launch `task_info` on the offer's agent.
    ///
    /// Transient tasks are sent with an empty id so the cluster assigns one
    /// at launch time; the recorded copy keeps the original id.
    pub fn launch(offer: &Offer, mut task_info: TaskInfo) -> Self {
        task_info.agent_id = Some(offer.agent_id.clone());

        let mut launched = task_info.clone();
        if task_info.is_transient() {
            launched.task_id = TaskId::empty();
        }

        Self {
            offer_id: offer.id.clone(),
            agent_id: offer.agent_id.clone(),
            operation: Operation::Launch {
                task_infos: vec![launched],
            },
            task_info: Some(task_info),
        }
    }

    /// Reserve `resources` from the offer.
    pub fn reserve(offer: &Offer, resources: Vec<Resource>) -> Self {
        Self {
            offer_id: offer.id.clone(),
            agent_id: offer.agent_id.clone(),
            operation: Operation::Reserve { resources },
            task_info: None,
        }
    }

    /// Whether this launches a transient task.
    pub fn is_transient(&self) -> bool {
        self.task_info.as_ref().is_some_and(TaskInfo::is_transient)
    }
}
