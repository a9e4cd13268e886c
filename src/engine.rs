//! The reconciliation core.
//!
//! Each pass runs two steps in order:
//!
//! 1. **Detach**: addresses are removed from instances that are no longer
//!    eligible (stopped, terminated, excluded by tag, ...).
//! 2. **Assign**: every pool address that nobody holds is bound to the best
//!    free eligible instance.
//!
//! Nothing here retries.  A failed call leaves the registry as the cloud
//! reported it, and the next pass sees the same gap and tries again.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::cloud::CloudGateway;
use crate::pool::AddressPool;
use crate::registry::{Instance, InstanceRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Associate,
    Disassociate,
}

/// A gateway mutation issued during a pass, and how it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub instance_id: String,
    pub public_ip: String,
    pub outcome: Result<(), String>,
}

impl Mutation {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs the detach pass followed by the assign pass.
pub async fn reconcile<G>(
    gateway: &G,
    registry: &mut InstanceRegistry,
    pool: &AddressPool,
) -> Vec<Mutation>
where
    G: CloudGateway + ?Sized,
{
    let mut mutations = Vec::new();
    detach_ineligible(gateway, registry, &mut mutations).await;
    assign_unbound(gateway, registry, pool, &mut mutations).await;
    mutations
}

/// Removes pool addresses from every instance that may no longer hold them.
pub async fn detach_ineligible<G>(
    gateway: &G,
    registry: &mut InstanceRegistry,
    mutations: &mut Vec<Mutation>,
) where
    G: CloudGateway + ?Sized,
{
    for instance in registry.iter_mut() {
        if instance.is_eligible() || instance.elastic_ips.is_empty() {
            continue;
        }

        if !instance.pool_member {
            info!("Node {:?} no longer part of pool; will remove elastic ips", instance.id);
        }
        if !instance.can_hold_address {
            info!(
                "Node {:?} state is {:?}; will remove elastic ips",
                instance.id,
                instance.state.as_str()
            );
        }

        let held: Vec<String> = instance.elastic_ips.iter().cloned().collect();
        for public_ip in held {
            if let Some(mutation) = detach_one(gateway, instance, &public_ip).await {
                mutations.push(mutation);
            }
        }
    }
}

async fn detach_one<G>(gateway: &G, instance: &mut Instance, public_ip: &str) -> Option<Mutation>
where
    G: CloudGateway + ?Sized,
{
    if !instance.has_association(public_ip) {
        warn!(
            "Want to disassociate address {:?} from {:?}, but was not found",
            public_ip, instance.id
        );
        return None;
    }

    let association_id = match gateway.describe_address(public_ip).await {
        Ok(Some(address)) if bound_elsewhere(address.instance_id.as_deref(), &instance.id) => {
            warn!(
                "Want to disassociate address {:?} from {:?}, but it is bound to {:?}",
                public_ip,
                instance.id,
                address.instance_id.unwrap_or_default()
            );
            return None;
        }
        Ok(Some(address)) => match address.association_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                warn!(
                    "Want to disassociate address {:?} from {:?}, but it has no association",
                    public_ip, instance.id
                );
                return None;
            }
        },
        Ok(None) => {
            warn!("Want to disassociate address {:?}, but the address was not found", public_ip);
            return None;
        }
        Err(e) => {
            warn!("failed to describe address {:?}: {}", public_ip, e);
            return None;
        }
    };

    let outcome = match gateway
        .disassociate(&instance.id, public_ip, &association_id)
        .await
    {
        Ok(()) => {
            instance.elastic_ips.remove(public_ip);
            Ok(())
        }
        Err(e) => {
            warn!("failed to remove address {:?} from {:?}: {}", public_ip, instance.id, e);
            Err(e.to_string())
        }
    };

    Some(Mutation {
        kind: MutationKind::Disassociate,
        instance_id: instance.id.clone(),
        public_ip: public_ip.to_string(),
        outcome,
    })
}

fn bound_elsewhere(holder: Option<&str>, instance_id: &str) -> bool {
    holder.is_some_and(|id| id != instance_id)
}

/// Binds each unheld pool address, in pool order, to the best free candidate.
pub async fn assign_unbound<G>(
    gateway: &G,
    registry: &mut InstanceRegistry,
    pool: &AddressPool,
    mutations: &mut Vec<Mutation>,
) where
    G: CloudGateway + ?Sized,
{
    let mut holders: HashMap<String, String> = HashMap::new();
    for instance in registry.iter() {
        for public_ip in &instance.elastic_ips {
            holders.insert(public_ip.clone(), instance.id.clone());
        }
    }

    for address in pool.iter() {
        if let Some(holder) = holders.get(&address.public_ip) {
            debug!("EIP {:?} is assigned to {:?}", address.public_ip, holder);
            continue;
        }

        let Some(chosen) = select_candidate(registry) else {
            warn!("No instance available to assign EIP: {:?}", address.public_ip);
            continue;
        };

        info!("Assigning IP {:?} to instance {:?}", address.public_ip, chosen);
        let outcome = match gateway
            .associate(&chosen, &address.public_ip, &address.allocation_id)
            .await
        {
            Ok(()) => {
                if let Some(instance) = registry.get_mut(&chosen) {
                    instance.elastic_ips.insert(address.public_ip.clone());
                }
                holders.insert(address.public_ip.clone(), chosen.clone());
                Ok(())
            }
            Err(e) => {
                warn!("failed to assign address {:?} to {:?}: {}", address.public_ip, chosen, e);
                Err(e.to_string())
            }
        };

        mutations.push(Mutation {
            kind: MutationKind::Associate,
            instance_id: chosen,
            public_ip: address.public_ip.clone(),
            outcome,
        });
    }
}

/// Highest goodness among eligible instances holding no pool address.
///
/// Ties go to the lowest instance id.
pub fn select_candidate(registry: &InstanceRegistry) -> Option<String> {
    let mut chosen: Option<&Instance> = None;
    for instance in registry.iter() {
        if !instance.is_eligible() || !instance.elastic_ips.is_empty() {
            continue;
        }
        if chosen.map_or(true, |c| instance.goodness > c.goodness) {
            chosen = Some(instance);
        }
    }
    chosen.map(|i| i.id.clone())
}
