use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CloudAddress, CloudInstance};

pub mod aws;
#[cfg(test)]
pub mod fake;

pub use aws::AwsCloud;

/// Errors returned by a [`CloudGateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The cloud API call failed.
    #[error("error during {operation}: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    /// More than one address matched a public IP that should be unique.
    #[error("found {count} elastic ips with public ip {public_ip:?}")]
    Ambiguous { public_ip: String, count: usize },

    /// The instance metadata service could not tell us who we are.
    #[error("error querying instance metadata: {0}")]
    Metadata(String),
}

/// The cloud operations the controller needs.
///
/// Implementations are expected to be thin: no caching, no retries.  Every
/// pass re-reads the cloud, so a failed call is simply tried again next pass.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// All instances belonging to the cluster, in any state.
    async fn list_instances(&self) -> Result<Vec<CloudInstance>, GatewayError>;

    /// All allocated addresses visible to the account.
    async fn list_addresses(&self) -> Result<Vec<CloudAddress>, GatewayError>;

    /// Looks up a single address by its public IP.  `Ok(None)` if it does not exist.
    async fn describe_address(&self, public_ip: &str)
        -> Result<Option<CloudAddress>, GatewayError>;

    /// Binds an allocated address to an instance.
    async fn associate(
        &self,
        instance_id: &str,
        public_ip: &str,
        allocation_id: &str,
    ) -> Result<(), GatewayError>;

    /// Removes an existing binding.
    async fn disassociate(
        &self,
        instance_id: &str,
        public_ip: &str,
        association_id: &str,
    ) -> Result<(), GatewayError>;
}
