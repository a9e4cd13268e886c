use super::{CloudGateway, GatewayError};
use crate::types::{CloudAddress, CloudInstance, LifecycleState, NetworkAssociation};
use async_trait::async_trait;
use aws_config::imds;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{Address, Filter, Instance};
use aws_sdk_ec2::Client;
use log::{debug, info};

/// Tag that separates logically independent clusters in the same region.
pub const TAG_KUBERNETES_CLUSTER: &str = "KubernetesCluster";

/// EC2 implementation of [`CloudGateway`].
///
/// Instance listing is restricted to instances carrying the cluster tag, so
/// several clusters can share an account and region.
pub struct AwsCloud {
    ec2: Client,
    cluster_id: String,
}

impl AwsCloud {
    /// Builds a client from the default AWS configuration chain.
    ///
    /// Without an explicit cluster id we ask the instance metadata service who
    /// we are and take the cluster tag from our own instance.
    pub async fn new(cluster_id: Option<String>) -> Result<Self, GatewayError> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let ec2 = Client::new(&sdk_config);

        let cluster_id = match cluster_id {
            Some(id) => id,
            None => Self::discover_cluster_id(&ec2).await?,
        };
        info!("ClusterID is {:?}", cluster_id);

        Ok(Self { ec2, cluster_id })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    async fn discover_cluster_id(ec2: &Client) -> Result<String, GatewayError> {
        let metadata = imds::Client::builder().build();
        let instance_id = metadata
            .get("/latest/meta-data/instance-id")
            .await
            .map_err(|e| {
                GatewayError::Metadata(format!("instance-id: {}", DisplayErrorContext(e)))
            })?;
        let instance_id = AsRef::<str>::as_ref(&instance_id).to_string();
        info!("Running on instance {:?}", instance_id);

        debug!("AWS API Request: ec2/DescribeInstances ({})", instance_id);
        let output = ec2
            .describe_instances()
            .instance_ids(&instance_id)
            .send()
            .await
            .map_err(api_error("DescribeInstances"))?;

        let instances: Vec<&Instance> = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .collect();
        if instances.len() != 1 {
            return Err(GatewayError::Metadata(format!(
                "unexpected number of instances found with id {:?}: {}",
                instance_id,
                instances.len()
            )));
        }

        find_tag(instances[0], TAG_KUBERNETES_CLUSTER)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::Metadata(format!(
                    "cluster-id flag must be set: tag {:?} not found on this instance ({:?})",
                    TAG_KUBERNETES_CLUSTER, instance_id
                ))
            })
    }
}

#[async_trait]
impl CloudGateway for AwsCloud {
    async fn list_instances(&self) -> Result<Vec<CloudInstance>, GatewayError> {
        debug!("AWS API Request: ec2/DescribeInstances (cluster {:?})", self.cluster_id);

        let cluster_filter = Filter::builder()
            .name(format!("tag:{}", TAG_KUBERNETES_CLUSTER))
            .values(&self.cluster_id)
            .build();
        let mut pages = self
            .ec2
            .describe_instances()
            .filters(cluster_filter)
            .into_paginator()
            .send();

        let mut instances = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(api_error("DescribeInstances"))?;
            for reservation in page.reservations() {
                instances.extend(reservation.instances().iter().map(to_cloud_instance));
            }
        }
        Ok(instances)
    }

    async fn list_addresses(&self) -> Result<Vec<CloudAddress>, GatewayError> {
        debug!("AWS API Request: ec2/DescribeAddresses");

        let output = self
            .ec2
            .describe_addresses()
            .send()
            .await
            .map_err(api_error("DescribeAddresses"))?;
        Ok(output.addresses().iter().map(to_cloud_address).collect())
    }

    async fn describe_address(
        &self,
        public_ip: &str,
    ) -> Result<Option<CloudAddress>, GatewayError> {
        debug!("AWS API Request: ec2/DescribeAddresses ({})", public_ip);

        let output = self
            .ec2
            .describe_addresses()
            .filters(Filter::builder().name("public-ip").values(public_ip).build())
            .send()
            .await
            .map_err(api_error("DescribeAddresses"))?;

        match output.addresses() {
            [] => Ok(None),
            [address] => Ok(Some(to_cloud_address(address))),
            many => Err(GatewayError::Ambiguous {
                public_ip: public_ip.to_string(),
                count: many.len(),
            }),
        }
    }

    async fn associate(
        &self,
        instance_id: &str,
        public_ip: &str,
        allocation_id: &str,
    ) -> Result<(), GatewayError> {
        info!(
            "Attaching Elastic IP {:?} to {:?} (allocation {:?})",
            public_ip, instance_id, allocation_id
        );

        self.ec2
            .associate_address()
            .instance_id(instance_id)
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(api_error("AssociateAddress"))?;
        Ok(())
    }

    async fn disassociate(
        &self,
        instance_id: &str,
        public_ip: &str,
        association_id: &str,
    ) -> Result<(), GatewayError> {
        info!(
            "Removing Elastic IP {:?} from {:?} (association {:?})",
            public_ip, instance_id, association_id
        );

        self.ec2
            .disassociate_address()
            .association_id(association_id)
            .send()
            .await
            .map_err(api_error("DisassociateAddress"))?;
        Ok(())
    }
}

fn api_error<E>(operation: &'static str) -> impl FnOnce(E) -> GatewayError
where
    E: std::error::Error,
{
    move |err| GatewayError::Api {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn find_tag<'a>(instance: &'a Instance, key: &str) -> Option<&'a str> {
    instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some(key))
        .and_then(|tag| tag.value())
}

fn to_cloud_instance(instance: &Instance) -> CloudInstance {
    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|name| LifecycleState::from(name.as_str()))
        .unwrap_or_else(|| LifecycleState::Unknown(String::new()));

    let tags = instance
        .tags()
        .iter()
        .filter_map(|tag| {
            let key = tag.key()?;
            Some((key.to_string(), tag.value().unwrap_or_default().to_string()))
        })
        .collect();

    let associations = instance
        .network_interfaces()
        .iter()
        .filter_map(|ni| ni.association())
        .filter_map(|assoc| assoc.public_ip())
        .filter(|ip| !ip.is_empty())
        .map(|ip| NetworkAssociation {
            public_ip: ip.to_string(),
        })
        .collect();

    CloudInstance {
        id: instance.instance_id().unwrap_or_default().to_string(),
        state,
        tags,
        associations,
    }
}

fn to_cloud_address(address: &Address) -> CloudAddress {
    CloudAddress {
        public_ip: address.public_ip().unwrap_or_default().to_string(),
        allocation_id: address.allocation_id().map(str::to_string),
        association_id: address.association_id().map(str::to_string),
        instance_id: address.instance_id().map(str::to_string),
    }
}
