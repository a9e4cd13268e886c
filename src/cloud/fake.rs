//! In-memory cloud used by the tests.
//!
//! Associations made through the gateway are applied to the model, so a
//! following `list_instances` sees them just like a real cloud would.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CloudGateway, GatewayError};
use crate::eligibility::DEFAULT_MASTER_TAG;
use crate::types::{CloudAddress, CloudInstance, LifecycleState, NetworkAssociation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Associate {
        instance_id: String,
        public_ip: String,
        allocation_id: String,
    },
    Disassociate {
        instance_id: String,
        public_ip: String,
        association_id: String,
    },
}

#[derive(Default)]
struct State {
    instances: BTreeMap<String, CloudInstance>,
    addresses: BTreeMap<String, CloudAddress>,
    next_association: u32,
    calls: Vec<Call>,
    describes: usize,
    instance_lists: usize,
    fail_list: bool,
    fail_describe: bool,
    fail_associate: HashSet<String>,
    fail_disassociate: HashSet<String>,
}

#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allocated, unbound address.  Allocation ids are `eipalloc-<ip>`.
    pub fn with_address(self, public_ip: &str) -> Self {
        self.state.lock().unwrap().addresses.insert(
            public_ip.to_string(),
            CloudAddress {
                public_ip: public_ip.to_string(),
                allocation_id: Some(format!("eipalloc-{}", public_ip)),
                association_id: None,
                instance_id: None,
            },
        );
        self
    }

    pub fn with_instance(self, id: &str, state: &str) -> Self {
        self.upsert_instance(id, state);
        self
    }

    pub fn with_master(self, id: &str, state: &str) -> Self {
        self.upsert_instance(id, state);
        self.tag(id, DEFAULT_MASTER_TAG, "1");
        self
    }

    pub fn upsert_instance(&self, id: &str, state: &str) {
        let mut s = self.state.lock().unwrap();
        let instance = s
            .instances
            .entry(id.to_string())
            .or_insert_with(|| CloudInstance {
                id: id.to_string(),
                ..Default::default()
            });
        instance.state = LifecycleState::from(state);
    }

    pub fn set_state(&self, id: &str, state: &str) {
        self.upsert_instance(id, state);
    }

    pub fn tag(&self, id: &str, key: &str, value: &str) {
        let mut s = self.state.lock().unwrap();
        if let Some(instance) = s.instances.get_mut(id) {
            instance.tags.insert(key.to_string(), value.to_string());
        }
    }

    /// Removes an instance from the listing, dropping any bindings it had.
    pub fn remove_instance(&self, id: &str) {
        let mut s = self.state.lock().unwrap();
        s.instances.remove(id);
        for address in s.addresses.values_mut() {
            if address.instance_id.as_deref() == Some(id) {
                address.instance_id = None;
                address.association_id = None;
            }
        }
    }

    /// Binds an address behind the controller's back.
    pub fn bind(&self, id: &str, public_ip: &str) {
        let mut s = self.state.lock().unwrap();
        bind_locked(&mut s, id, public_ip);
    }

    /// Unbinds an address behind the controller's back.
    pub fn unbind(&self, public_ip: &str) {
        let mut s = self.state.lock().unwrap();
        unbind_locked(&mut s, public_ip);
    }

    /// Reports a public IP on the instance without any address record behind it.
    pub fn attach_public_ip(&self, id: &str, public_ip: &str) {
        let mut s = self.state.lock().unwrap();
        if let Some(instance) = s.instances.get_mut(id) {
            instance.associations.push(NetworkAssociation {
                public_ip: public_ip.to_string(),
            });
        }
    }

    /// Adds a raw instance record verbatim, including malformed ones.
    pub fn push_raw(&self, instance: CloudInstance) {
        let mut s = self.state.lock().unwrap();
        s.instances.insert(instance.id.clone(), instance);
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_describe(&self, fail: bool) {
        self.state.lock().unwrap().fail_describe = fail;
    }

    pub fn fail_associate(&self, public_ip: &str, fail: bool) {
        let mut s = self.state.lock().unwrap();
        if fail {
            s.fail_associate.insert(public_ip.to_string());
        } else {
            s.fail_associate.remove(public_ip);
        }
    }

    pub fn fail_disassociate(&self, public_ip: &str, fail: bool) {
        let mut s = self.state.lock().unwrap();
        if fail {
            s.fail_disassociate.insert(public_ip.to_string());
        } else {
            s.fail_disassociate.remove(public_ip);
        }
    }

    /// Drains the recorded mutation calls.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state.lock().unwrap().calls)
    }

    pub fn describes(&self) -> usize {
        self.state.lock().unwrap().describes
    }

    pub fn instance_lists(&self) -> usize {
        self.state.lock().unwrap().instance_lists
    }

    /// Instance currently holding the address, according to the cloud.
    pub fn holder(&self, public_ip: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .addresses
            .get(public_ip)
            .and_then(|a| a.instance_id.clone())
    }
}

fn bind_locked(s: &mut State, id: &str, public_ip: &str) {
    s.next_association += 1;
    let association_id = format!("eipassoc-{}", s.next_association);
    if let Some(address) = s.addresses.get_mut(public_ip) {
        address.instance_id = Some(id.to_string());
        address.association_id = Some(association_id);
    }
    if let Some(instance) = s.instances.get_mut(id) {
        instance.associations.push(NetworkAssociation {
            public_ip: public_ip.to_string(),
        });
    }
}

fn unbind_locked(s: &mut State, public_ip: &str) {
    if let Some(address) = s.addresses.get_mut(public_ip) {
        if let Some(id) = address.instance_id.take() {
            if let Some(instance) = s.instances.get_mut(&id) {
                instance.associations.retain(|a| a.public_ip != public_ip);
            }
        }
        address.association_id = None;
    }
}

fn injected(operation: &'static str) -> GatewayError {
    GatewayError::Api {
        operation,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl CloudGateway for FakeCloud {
    async fn list_instances(&self) -> Result<Vec<CloudInstance>, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.instance_lists += 1;
        if s.fail_list {
            return Err(injected("DescribeInstances"));
        }
        Ok(s.instances.values().cloned().collect())
    }

    async fn list_addresses(&self) -> Result<Vec<CloudAddress>, GatewayError> {
        let s = self.state.lock().unwrap();
        if s.fail_list {
            return Err(injected("DescribeAddresses"));
        }
        Ok(s.addresses.values().cloned().collect())
    }

    async fn describe_address(
        &self,
        public_ip: &str,
    ) -> Result<Option<CloudAddress>, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.describes += 1;
        if s.fail_describe {
            return Err(injected("DescribeAddresses"));
        }
        Ok(s.addresses.get(public_ip).cloned())
    }

    async fn associate(
        &self,
        instance_id: &str,
        public_ip: &str,
        allocation_id: &str,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Associate {
            instance_id: instance_id.to_string(),
            public_ip: public_ip.to_string(),
            allocation_id: allocation_id.to_string(),
        });
        if s.fail_associate.contains(public_ip) {
            return Err(injected("AssociateAddress"));
        }
        // Like EC2, associating an already bound address moves it.
        unbind_locked(&mut s, public_ip);
        bind_locked(&mut s, instance_id, public_ip);
        Ok(())
    }

    async fn disassociate(
        &self,
        instance_id: &str,
        public_ip: &str,
        association_id: &str,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Disassociate {
            instance_id: instance_id.to_string(),
            public_ip: public_ip.to_string(),
            association_id: association_id.to_string(),
        });
        if s.fail_disassociate.contains(public_ip) {
            return Err(injected("DisassociateAddress"));
        }
        unbind_locked(&mut s, public_ip);
        Ok(())
    }
}
