//! Accepting recommendations and recording what was launched.

use std::sync::Arc;

use async_trait::async_trait;
use berth_core::{OfferId, Operation};
use berth_storage::{StateStore, StorageError};
use tracing::{error, info};

use crate::driver::SchedulerDriver;
use crate::recommendation::OfferRecommendation;

/// Submits recommendations to the cluster.
#[async_trait]
pub trait OfferAccepter: Send + Sync {
    /// Accept `recommendations`, returning the ids of the offers that were accepted.
    async fn accept(
        &self,
        driver: &dyn SchedulerDriver,
        recommendations: Vec<OfferRecommendation>,
    ) -> Vec<OfferId>;
}

/// Observes recommendations once their offer has been accepted.
#[async_trait]
pub trait OperationRecorder: Send + Sync {
    /// Record an accepted recommendation.
    async fn record(&self, recommendation: &OfferRecommendation) -> Result<(), StorageError>;
}

/// Persists launched tasks in the state store.
pub struct PersistentLaunchRecorder {
    store: Arc<dyn StateStore>,
}

impl PersistentLaunchRecorder {
    /// Create a recorder writing to `store`.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationRecorder for PersistentLaunchRecorder {
    async fn record(&self, recommendation: &OfferRecommendation) -> Result<(), StorageError> {
        if let Some(task_info) = &recommendation.task_info {
            info!("Recording launch of {} ({})", task_info.name, task_info.task_id);
            self.store.store_tasks(std::slice::from_ref(task_info)).await?;
        }
        Ok(())
    }
}

/// Groups recommendations per offer, accepts each offer through the driver
/// and hands accepted recommendations to its recorders.
#[derive(Default)]
pub struct DefaultOfferAccepter {
    recorders: Vec<Arc<dyn OperationRecorder>>,
}

impl DefaultOfferAccepter {
    /// Create an accepter with no recorders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn OperationRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }
}

#[async_trait]
impl OfferAccepter for DefaultOfferAccepter {
    async fn accept(
        &self,
        driver: &dyn SchedulerDriver,
        recommendations: Vec<OfferRecommendation>,
    ) -> Vec<OfferId> {
        let mut grouped: Vec<(OfferId, Vec<OfferRecommendation>)> = Vec::new();
        for recommendation in recommendations {
            match grouped.iter_mut().find(|(id, _)| *id == recommendation.offer_id) {
                Some((_, recs)) => recs.push(recommendation),
                None => grouped.push((recommendation.offer_id.clone(), vec![recommendation])),
            }
        }

        let mut accepted = Vec::with_capacity(grouped.len());
        for (offer_id, recs) in grouped {
            let operations: Vec<Operation> = recs.iter().map(|r| r.operation.clone()).collect();
            info!("Accepting offer {} with {} operations", offer_id, operations.len());

            if let Err(e) = driver
                .accept_offers(std::slice::from_ref(&offer_id), &operations)
                .await
            {
                error!("Failed to accept offer {}: {}", offer_id, e);
                continue;
            }

            for rec in &recs {
                for recorder in &self.recorders {
                    if let Err(e) = recorder.record(rec).await {
                        error!("Failed to record {} on offer {}: {}", rec.operation.kind(), offer_id, e);
                    }
                }
            }
            accepted.push(offer_id);
        }
        accepted
    }
}
