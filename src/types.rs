//! Data structures describing what the cloud reports.
//!
//! These are the raw records a [`CloudGateway`](crate::cloud::CloudGateway)
//! hands to the controller on every pass.  They carry only the fields the
//! reconciliation needs: identity, lifecycle state, tags and the public
//! addresses currently associated with the instance's network interfaces.

use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of an instance as reported by the cloud.
///
/// Anything the cloud reports that we do not recognise is kept verbatim in
/// [`LifecycleState::Unknown`] so it can be logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown(String),
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for LifecycleState {
    fn from(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A public address associated with one of an instance's network interfaces.
///
/// This may be an elastic IP from our pool, an elastic IP we do not manage,
/// or an ordinary auto-assigned public IP; the cloud does not distinguish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAssociation {
    pub public_ip: String,
}

/// One instance from a `list_instances` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudInstance {
    /// Instance identifier.  Empty means the cloud returned malformed data.
    pub id: String,
    pub state: LifecycleState,
    pub tags: BTreeMap<String, String>,
    pub associations: Vec<NetworkAssociation>,
}

/// An allocated public address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudAddress {
    pub public_ip: String,
    /// Identifies the reservation; needed to associate the address.
    pub allocation_id: Option<String>,
    /// Identifies the current binding, if any; needed to disassociate.
    pub association_id: Option<String>,
    /// Instance the address is bound to, if any.
    pub instance_id: Option<String>,
}
