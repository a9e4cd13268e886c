//! eipd entry point.

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use tokio::signal;

mod cloud;
mod config;
mod controller;
mod eligibility;
mod engine;
mod error;
mod pool;
mod registry;
mod types;

use cloud::AwsCloud;
use config::{Cli, Config};
use controller::ElasticIpController;
use eligibility::EligibilityClassifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    info!("Starting eipd with config: {:?}", cfg);

    // Cloud
    let cloud = AwsCloud::new(cfg.cluster_id.clone())
        .await
        .context("error building cloud")?;
    info!("Managing cluster {:?}", cloud.cluster_id());

    let classifier = EligibilityClassifier::new(cfg.master_tag.clone());
    let mut controller =
        ElasticIpController::new(cloud, cfg.sync_period(), &cfg.elastic_ips, classifier)
            .await
            .context("error building elastic ip controller")?;

    // Run until Ctrl+C; a pass in flight is allowed to finish.
    controller
        .run(async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    info!("Shutdown complete.");
    Ok(())
}
