//! Instances we know about, tracked across passes.
//!
//! The cloud never tells us an instance went away; it simply stops listing
//! it.  Every refresh bumps a tick and stamps each listed instance with it,
//! and whatever was not stamped is dropped.

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};

use crate::pool::AddressPool;
use crate::types::{CloudInstance, LifecycleState, NetworkAssociation};

/// Generation counter, incremented once per pass.
pub type Tick = u64;

/// What we know about one instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,

    /// Tick of the last snapshot that listed this instance.
    pub tick: Tick,

    /// Raw state from the most recent snapshot.
    pub state: LifecycleState,
    pub tags: BTreeMap<String, String>,
    pub associations: Vec<NetworkAssociation>,

    /// False for instances excluded by tag (e.g. the master).
    pub pool_member: bool,

    /// Whether the lifecycle state allows holding an address.
    pub can_hold_address: bool,

    /// Higher is a better assignment candidate.
    pub goodness: i32,

    /// Pool addresses currently bound to this instance.
    pub elastic_ips: BTreeSet<String>,
}

impl Instance {
    fn new(id: String) -> Self {
        Self {
            id,
            tick: 0,
            state: LifecycleState::default(),
            tags: BTreeMap::new(),
            associations: Vec::new(),
            pool_member: false,
            can_hold_address: false,
            goodness: 0,
            elastic_ips: BTreeSet::new(),
        }
    }

    /// Pool member in a state that may hold an address.
    pub fn is_eligible(&self) -> bool {
        self.pool_member && self.can_hold_address
    }

    /// Whether the cloud currently reports `public_ip` on one of our interfaces.
    pub fn has_association(&self, public_ip: &str) -> bool {
        self.associations.iter().any(|a| a.public_ip == public_ip)
    }
}

/// Result of ingesting one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub tick: Tick,
    pub seen: usize,
    pub added: usize,
    pub skipped: usize,
    pub removed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: BTreeMap<String, Instance>,
    tick: Tick,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Ingests a fresh snapshot and forgets instances missing from it.
    ///
    /// Bound addresses are re-derived from the reported associations; only
    /// addresses in `pool` count; anything else may be an auto-assigned
    /// public IP.  Classification is left to the caller.
    pub fn refresh(&mut self, snapshot: Vec<CloudInstance>, pool: &AddressPool) -> RefreshSummary {
        self.tick += 1;
        let tick = self.tick;
        let mut summary = RefreshSummary {
            tick,
            ..Default::default()
        };

        for raw in snapshot {
            if raw.id.is_empty() {
                warn!("skipping instance with empty instance id: {:?}", raw);
                summary.skipped += 1;
                continue;
            }

            let instance = self.instances.entry(raw.id.clone()).or_insert_with(|| {
                summary.added += 1;
                Instance::new(raw.id.clone())
            });

            instance.tick = tick;
            instance.elastic_ips = raw
                .associations
                .iter()
                .map(|a| a.public_ip.as_str())
                .filter(|ip| !ip.is_empty() && pool.contains(ip))
                .map(str::to_string)
                .collect();
            instance.state = raw.state;
            instance.tags = raw.tags;
            instance.associations = raw.associations;
            summary.seen += 1;
        }

        self.instances.retain(|id, instance| {
            if instance.tick == tick {
                return true;
            }
            info!("Instance deleted: {:?}", id);
            summary.removed.push(id.clone());
            false
        });

        summary
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Instance> {
        self.instances.get_mut(id)
    }

    /// Instances ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Instance> {
        self.instances.values_mut()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}
