//! Decides which instances may hold an elastic ip.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::registry::Instance;
use crate::types::LifecycleState;

/// Tag key marking the cluster master, which never joins the pool.
pub const DEFAULT_MASTER_TAG: &str = "k8s.io/role/master";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub pool_member: bool,
    pub can_hold_address: bool,
    pub goodness: i32,
}

impl Classification {
    pub fn is_eligible(&self) -> bool {
        self.pool_member && self.can_hold_address
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityClassifier {
    master_tag: String,
}

impl Default for EligibilityClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MASTER_TAG)
    }
}

impl EligibilityClassifier {
    pub fn new(master_tag: impl Into<String>) -> Self {
        Self {
            master_tag: master_tag.into(),
        }
    }

    /// Classifies from raw state and tags.
    ///
    /// `prior_can_hold` is returned unchanged for states we do not recognise,
    /// so an instance does not flap on a transient or new state name.
    pub fn classify(
        &self,
        state: &LifecycleState,
        tags: &BTreeMap<String, String>,
        prior_can_hold: bool,
    ) -> Classification {
        let pool_member = !tags.contains_key(&self.master_tag);

        let mut goodness = 0;
        let can_hold_address = match state {
            LifecycleState::Running => {
                goodness += 1;
                true
            }
            LifecycleState::Pending
            | LifecycleState::ShuttingDown
            | LifecycleState::Terminated
            | LifecycleState::Stopping
            | LifecycleState::Stopped => false,
            // TODO: confirm with product whether unknown states should clear eligibility.
            LifecycleState::Unknown(_) => prior_can_hold,
        };

        Classification {
            pool_member,
            can_hold_address,
            goodness,
        }
    }

    /// Classifies `instance` in place.
    pub fn apply(&self, instance: &mut Instance) -> Classification {
        if let LifecycleState::Unknown(raw) = &instance.state {
            warn!("unknown instance state for instance {:?}: {:?}", instance.id, raw);
        }

        let c = self.classify(&instance.state, &instance.tags, instance.can_hold_address);
        if !c.pool_member {
            debug!("instance {:?} is master; won't treat as part of pool", instance.id);
        }

        instance.pool_member = c.pool_member;
        instance.can_hold_address = c.can_hold_address;
        instance.goodness = c.goodness;
        c
    }
}
