//! Offer model - an agent's advertised capacity and the operations run against it.

use serde::{Deserialize, Serialize};

use crate::id::{AgentId, OfferId};
use crate::resource::Resource;
use crate::task::TaskInfo;

/// One agent's transient advertisement of claimable resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer id
    pub id: OfferId,

    /// Agent that owns the resources
    pub agent_id: AgentId,

    /// Agent hostname
    #[serde(default)]
    pub hostname: String,

    /// Offered resources, in advertisement order
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Offer {
    /// Create an offer.
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            id: OfferId::new(id),
            agent_id: AgentId::new(agent_id),
            hostname: String::new(),
            resources,
        }
    }
}

/// An operation performed against an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Launch tasks on the offer's agent
    Launch {
        /// Tasks to launch
        task_infos: Vec<TaskInfo>,
    },
    /// Dynamically reserve resources
    Reserve {
        /// Resources to reserve
        resources: Vec<Resource>,
    },
    /// Release previously reserved resources
    Unreserve {
        /// Resources to release
        resources: Vec<Resource>,
    },
}

impl Operation {
    /// Tasks launched by this operation (empty for non-launch operations).
    pub fn launched_tasks(&self) -> &[TaskInfo] {
        match self {
            Operation::Launch { task_infos } => task_infos,
            _ => &[],
        }
    }

    /// Short name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Launch { .. } => "LAUNCH",
            Operation::Reserve { .. } => "RESERVE",
            Operation::Unreserve { .. } => "UNRESERVE",
        }
    }
}
