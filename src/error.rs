//! Startup errors.
//!
//! Everything here is fatal: once the reconciliation loop is running, cloud
//! failures are logged and retried on the next pass instead of surfacing as
//! errors.

use thiserror::Error;

use crate::cloud::GatewayError;

/// Resolving the configured addresses against the cloud failed.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no elastic ips configured")]
    Empty,

    #[error("address not found: {0:?}")]
    AddressNotFound(String),

    #[error("address {0:?} has no allocation id")]
    MissingAllocationId(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// The merged configuration is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("must specify at least one elastic ip with --eip")]
    NoElasticIps,

    #[error("invalid elastic ip {0:?}")]
    InvalidElasticIp(String),

    #[error("sync period must be greater than zero")]
    ZeroSyncPeriod,
}
