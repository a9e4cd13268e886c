use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::eligibility::DEFAULT_MASTER_TAG;
use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "eipd.toml";

/// Command line flags.  Anything left unset falls through to the config
/// files and `EIPD_` environment variables.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "eipd", about = "Keeps elastic ips bound to healthy cluster instances")]
pub struct Cli {
    /// TOML config file.
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Cluster to manage; defaults to the cluster tag of this instance.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// Elastic ip to keep assigned.  Repeat or comma-separate for several.
    #[arg(long = "eip", value_delimiter = ',')]
    #[serde(rename = "elastic_ips", skip_serializing_if = "Vec::is_empty")]
    pub elastic_ips: Vec<String>,

    /// Seconds between passes.
    #[arg(long = "sync-period")]
    #[serde(rename = "sync_period_secs", skip_serializing_if = "Option::is_none")]
    pub sync_period: Option<u64>,

    /// Tag key that keeps an instance out of the pool.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub elastic_ips: Vec<String>,
    pub sync_period_secs: u64,
    pub master_tag: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_id: None,
            elastic_ips: Vec::new(),
            sync_period_secs: 30,
            master_tag: DEFAULT_MASTER_TAG.into(),
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(cli)
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;
        config.validate()
    }

    /// Defaults, then files, then environment, then flags.
    pub fn figment(cli: &Cli) -> Figment {
        let file = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Json::file("eipd.json"))
            .merge(Env::prefixed("EIPD_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.sync_period_secs == 0 {
            return Err(ConfigError::ZeroSyncPeriod);
        }

        let mut elastic_ips: Vec<String> = Vec::with_capacity(self.elastic_ips.len());
        for raw in &self.elastic_ips {
            let ip = raw.trim();
            if ip.is_empty() {
                continue;
            }
            if ip.parse::<IpAddr>().is_err() {
                return Err(ConfigError::InvalidElasticIp(ip.to_string()));
            }
            if elastic_ips.iter().any(|existing| existing == ip) {
                warn!("elastic ip {:?} configured more than once", ip);
                continue;
            }
            elastic_ips.push(ip.to_string());
        }
        if elastic_ips.is_empty() {
            return Err(ConfigError::NoElasticIps);
        }
        self.elastic_ips = elastic_ips;

        self.cluster_id = self.cluster_id.filter(|id| !id.trim().is_empty());
        Ok(self)
    }
}
