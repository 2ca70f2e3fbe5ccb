//! # media-server-operator
//!
//! Entry point of the operator.
//!
//! - `run` connects to the cluster from the ambient kubeconfig or in-cluster
//!   service account and reconciles MediaServers until SIGTERM/SIGINT.
//! - `crd` prints the CustomResourceDefinition for installation.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use media_server_operator::api::{CustomResourceExt, MediaServer};
use media_server_operator::cli::{Cli, Command, RunArgs};
use media_server_operator::controller::{self, ControllerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Crd => print_crd(),
        Command::Run(args) => run(&args).await,
    }
}

fn print_crd() -> Result<()> {
    let yaml = serde_yaml::to_string(&MediaServer::crd()).context("Failed to render CRD")?;
    print!("{yaml}");
    Ok(())
}

async fn run(args: &RunArgs) -> Result<()> {
    init_tracing(&args.log_filter, args.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "media-server-operator starting");

    let client = Client::try_default()
        .await
        .context(
            "Failed to build Kubernetes client. Check KUBECONFIG or in-cluster service account",
        )?;

    controller::run(client, ControllerConfig::from(args)).await
}

/// Initialize the tracing subscriber.
fn init_tracing(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter).context("Invalid log filter")?;
    let fmt = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .try_init()
        .context("Failed to install tracing subscriber")
}
