//! The fixed set of addresses this controller keeps bound.

use std::collections::HashMap;

use log::info;

use crate::cloud::CloudGateway;
use crate::error::PoolError;

/// A configured address resolved to its cloud allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAddress {
    pub public_ip: String,
    pub allocation_id: String,
}

/// Immutable, ordered set of managed addresses.
///
/// Order is the configured order and is the order the assign pass walks.
#[derive(Debug, Clone)]
pub struct AddressPool {
    addresses: Vec<PoolAddress>,
}

impl AddressPool {
    /// Resolves every configured address with a single `list_addresses` call.
    ///
    /// Fails if any address is unknown to the cloud or lacks an allocation id;
    /// a partially resolved pool is never returned.
    pub async fn resolve<G>(gateway: &G, elastic_ips: &[String]) -> Result<Self, PoolError>
    where
        G: CloudGateway + ?Sized,
    {
        if elastic_ips.is_empty() {
            return Err(PoolError::Empty);
        }

        let all: HashMap<String, Option<String>> = gateway
            .list_addresses()
            .await?
            .into_iter()
            .map(|a| (a.public_ip, a.allocation_id))
            .collect();

        let mut addresses: Vec<PoolAddress> = Vec::with_capacity(elastic_ips.len());
        for ip in elastic_ips {
            if addresses.iter().any(|a| &a.public_ip == ip) {
                continue;
            }
            let allocation_id = match all.get(ip) {
                None => return Err(PoolError::AddressNotFound(ip.clone())),
                Some(None) => return Err(PoolError::MissingAllocationId(ip.clone())),
                Some(Some(id)) => id.clone(),
            };
            info!("Managing elastic ip {:?} (allocation {:?})", ip, allocation_id);
            addresses.push(PoolAddress {
                public_ip: ip.clone(),
                allocation_id,
            });
        }

        Ok(Self { addresses })
    }

    pub fn contains(&self, public_ip: &str) -> bool {
        self.addresses.iter().any(|a| a.public_ip == public_ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolAddress> {
        self.addresses.iter()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }
}
