//! Kyma operator - converges component configuration from Kyma resources

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use kyma_common::crd::{IstioConfiguration, Kyma};
use kyma_common::telemetry::{init_telemetry, TelemetryConfig};
use kyma_common::OPERATOR_NAME;
use kyma_operator::config::{OperatorArgs, OperatorConfig};
use kyma_operator::dependents::DependentTable;
use kyma_operator::store::Stores;
use kyma_operator::watch::kyma_triggers;
use kyma_operator::{Dispatcher, Reconciler};

/// Kyma operator - watches Kyma resources and manages their component configurations
#[derive(Parser, Debug)]
#[command(name = "kyma-operator", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    operator: OperatorArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let kyma = serde_yaml::to_string(&Kyma::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize Kyma CRD: {}", e))?;
        let istio = serde_yaml::to_string(&IstioConfiguration::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize IstioConfiguration CRD: {}", e))?;
        println!("{kyma}---\n{istio}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: OPERATOR_NAME.to_string(),
        log_format: cli.operator.log_format,
    })?;

    let config = cli.operator.into_config()?;
    run_controller(config).await
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        istio = config.dependents.istio_enabled,
        serverless = config.dependents.serverless_enabled,
        "Kyma controller starting"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let kymas: Api<Kyma> = match &config.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let reconciler = Arc::new(Reconciler::new(
        Stores::from_client(client),
        DependentTable::from_config(&config.dependents),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    Dispatcher::new(reconciler, config.dispatch)
        .run(kyma_triggers(kymas, config.watch_timeout), shutdown)
        .await;

    tracing::info!("Kyma controller stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
    shutdown.cancel();
}
