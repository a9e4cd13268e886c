//! Drives the reconciliation loop.

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info};
use tokio::time::sleep;

use crate::cloud::{CloudGateway, GatewayError};
use crate::eligibility::EligibilityClassifier;
use crate::engine::{self, Mutation};
use crate::error::PoolError;
use crate::pool::AddressPool;
use crate::registry::{InstanceRegistry, Tick};

/// What one pass saw and did.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub tick: Tick,
    pub instances: usize,
    pub removed: usize,
    pub pool_members: usize,
    pub eligible: usize,
    pub mutations: Vec<Mutation>,
}

/// Owns all reconciliation state.
///
/// Passes run strictly one after another; the registry and pool are never
/// shared outside this struct.
pub struct ElasticIpController<G> {
    cloud: G,
    period: Duration,
    pool: AddressPool,
    registry: InstanceRegistry,
    classifier: EligibilityClassifier,
}

impl<G: CloudGateway> ElasticIpController<G> {
    /// Resolves `elastic_ips` against the cloud.  Fails if any of them is unknown.
    pub async fn new(
        cloud: G,
        period: Duration,
        elastic_ips: &[String],
        classifier: EligibilityClassifier,
    ) -> Result<Self, PoolError> {
        let pool = AddressPool::resolve(&cloud, elastic_ips).await?;
        info!("Resolved {} elastic ips", pool.len());
        Ok(Self {
            cloud,
            period,
            pool,
            registry: InstanceRegistry::new(),
            classifier,
        })
    }

    #[cfg(test)]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Runs passes until `shutdown` resolves.
    ///
    /// Shutdown is only observed between passes; a pass in flight always
    /// completes.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            match self.run_once().await {
                Ok(report) => {
                    let failed = report.mutations.iter().filter(|m| !m.succeeded()).count();
                    debug!(
                        "Pass {} done: {} instances ({} in pool, {} eligible), {} removed, \
                         {} mutations ({} failed)",
                        report.tick,
                        report.instances,
                        report.pool_members,
                        report.eligible,
                        report.removed,
                        report.mutations.len(),
                        failed
                    );
                }
                Err(e) => error!("error running sync loop: {}", e),
            }

            tokio::select! {
                _ = sleep(self.period) => {}
                _ = &mut shutdown => {
                    info!("Stopping elastic ip controller");
                    return;
                }
            }
        }
    }

    /// One full pass: list, refresh, classify, detach, assign.
    pub async fn run_once(&mut self) -> Result<PassReport, GatewayError> {
        let snapshot = self.cloud.list_instances().await?;
        let refresh = self.registry.refresh(snapshot, &self.pool);
        debug!(
            "Tick {}: {} instances listed, {} new, {} skipped",
            refresh.tick, refresh.seen, refresh.added, refresh.skipped
        );

        let mut pool_members = 0;
        let mut eligible = 0;
        for instance in self.registry.iter_mut() {
            let c = self.classifier.apply(instance);
            if c.pool_member {
                pool_members += 1;
            }
            if c.is_eligible() {
                eligible += 1;
            }
            debug!(
                "Instance {:?}: pool={} state={:?} eips={:?}",
                instance.id,
                instance.pool_member,
                instance.state.as_str(),
                instance.elastic_ips
            );
        }

        info!(
            "Found {} instances, {} are in the pool, {} can hold elastic ips",
            self.registry.len(),
            pool_members,
            eligible
        );

        let mutations = engine::reconcile(&self.cloud, &mut self.registry, &self.pool).await;

        Ok(PassReport {
            tick: refresh.tick,
            instances: self.registry.len(),
            removed: refresh.removed.len(),
            pool_members,
            eligible,
            mutations,
        })
    }
}
