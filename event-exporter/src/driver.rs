//! Multi-Cluster Driver (C8, spec §4.8).
//!
//! Spawns one [`Supervisor`] per cluster configuration and waits for all of
//! them on a shared termination signal, grounded on `main.go`'s `appAction`
//! (`wait.Group` + a signal-fed stop channel) translated into `tokio`'s
//! idioms: a `CancellationToken` replaces the stop channel and
//! `JoinSet`/`Vec<Supervisor>` replaces `wait.Group`.

use std::time::Duration;

use event_exporter_core::prelude::*;
use event_exporter_store::{
    DocumentStoreConfig,
    Supervisor,
    SupervisorConfig,
};
use tracing::*;

pub struct ClusterConfig {
    pub client: kube::Client,
    pub kubernetes_host: String,
}

pub struct DriverConfig {
    pub resync_period: Duration,
    pub storage_ttl: Duration,
    pub use_pipes: Vec<String>,
    pub pipes_parallel: bool,
    pub termination_grace_period: Duration,
    pub debug_logging: bool,
}

/// Waits for `Ctrl-C` or, on unix, `SIGTERM` (spec §4.8 "a global signal
/// handler").
async fn wait_for_termination_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            },
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

pub async fn run(clusters: Vec<ClusterConfig>, config: DriverConfig) -> EmptyResult {
    if clusters.is_empty() {
        anyhow::bail!("no valid cluster configuration to watch");
    }

    // Only the mongodb pipe needs a connect URI (spec §6: "required for
    // mongodb pipe"); building it unconditionally would fail logger-only
    // deployments that never set PIPE_MONGODB_CONNECT_URI.
    let document_store =
        if config.use_pipes.iter().any(|p| p == "mongodb") { Some(DocumentStoreConfig::from_env()?) } else { None };

    let mut supervisors = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let supervisor_config = SupervisorConfig {
            kubernetes_host: cluster.kubernetes_host.clone(),
            resync_period: config.resync_period,
            storage_ttl: config.storage_ttl,
            use_pipes: config.use_pipes.clone(),
            pipes_parallel: config.pipes_parallel,
            debug_logging: config.debug_logging,
            document_store: document_store.clone(),
        };
        let supervisor = Supervisor::new(cluster.client, supervisor_config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to start exporter for {}: {e}", cluster.kubernetes_host))?;
        supervisors.push(supervisor);
    }

    info!("{} cluster(s) under watch, waiting for termination signal", supervisors.len());
    wait_for_termination_signal().await;
    debug!("termination signal received, shutting down");

    let shutdown = async {
        for supervisor in &supervisors {
            supervisor.stop().await;
        }
    };
    if tokio::time::timeout(config.termination_grace_period, shutdown).await.is_err() {
        warn!("termination grace period elapsed before all exporters finished stopping");
    }

    Ok(())
}
