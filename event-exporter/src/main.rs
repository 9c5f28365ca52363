mod driver;

use clap::Parser;
use event_exporter_core::logging;
use event_exporter_core::prelude::*;
use tracing::*;

use crate::driver::{
    ClusterConfig,
    DriverConfig,
};

/// Binds the configuration table of spec.md §6 exactly; defaults mirror the
/// original CLI's (`log-level=debug`, `log-format=simple`,
/// `resync-period=1m`, `storage-ttl=2h`, `termination-grace-period=1m`).
#[derive(Parser, Debug)]
#[command(name = "kubernetes-event-exporter", about = "An exporter exposes events of Kubernetes.")]
struct Options {
    #[arg(long, env = "LOG_LEVEL", default_value = "debug")]
    log_level: String,

    #[arg(long, env = "LOG_FORMAT", default_value = "simple")]
    log_format: String,

    /// One or more cluster kubeconfig file paths; empty = in-cluster.
    #[arg(long, env = "KUBECONFIG", value_delimiter = ',')]
    kubeconfig: Vec<String>,

    #[arg(long, env = "RESYNC_PERIOD", default_value = "1m")]
    resync_period: String,

    #[arg(long, env = "STORAGE_TTL", default_value = "2h")]
    storage_ttl: String,

    /// Repeatable: `logger`, `mongodb` (at least one required).
    #[arg(long = "use-pipe", env = "USE_PIPE", value_delimiter = ',')]
    use_pipes: Vec<String>,

    #[arg(long, env = "PIPES_PARALLEL")]
    pipes_parallel: bool,

    #[arg(long, env = "TERMINATION_GRACE_PERIOD", default_value = "1m")]
    termination_grace_period: String,
}

/// Builds one `kube::Client` per configured kubeconfig path, or a single
/// in-cluster client when none is given (spec §4.8, mirroring `main.go`'s
/// `appAction`).
async fn build_clusters(kubeconfigs: &[String]) -> anyhow::Result<Vec<ClusterConfig>> {
    if kubeconfigs.is_empty() {
        let config = kube::Config::infer().await.map_err(|e| anyhow::anyhow!("failed to create Kubernetes config from in-cluster: {e}"))?;
        let kubernetes_host = config.cluster_url.to_string();
        let client = kube::Client::try_from(config)
            .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client for {kubernetes_host}: {e}"))?;
        return Ok(vec![ClusterConfig { client, kubernetes_host }]);
    }

    let mut clusters = Vec::with_capacity(kubeconfigs.len());
    for path in kubeconfigs {
        if path.is_empty() {
            continue;
        }
        let kubeconfig = kube::config::Kubeconfig::read_from(path)
            .map_err(|e| anyhow::anyhow!("can't open {path}: {e}"))?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default())
            .await
            .map_err(|e| anyhow::anyhow!("failed to create Kubernetes config from {path}: {e}"))?;
        let kubernetes_host = config.cluster_url.to_string();
        let client = kube::Client::try_from(config)
            .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client for {kubernetes_host}: {e}"))?;
        clusters.push(ClusterConfig { client, kubernetes_host });
    }
    Ok(clusters)
}

#[instrument(ret, err)]
async fn run(opts: Options) -> EmptyResult {
    let clusters = build_clusters(&opts.kubeconfig).await?;

    let config = DriverConfig {
        resync_period: event_exporter_core::time::parse_duration(&opts.resync_period)?,
        storage_ttl: event_exporter_core::time::parse_duration(&opts.storage_ttl)?,
        use_pipes: opts.use_pipes,
        pipes_parallel: opts.pipes_parallel,
        termination_grace_period: event_exporter_core::time::parse_duration(&opts.termination_grace_period)?,
        debug_logging: matches!(opts.log_level.as_str(), "trace" | "debug"),
    };

    driver::run(clusters, config).await
}

#[tokio::main]
async fn main() {
    let opts = Options::parse();
    if let Err(e) = logging::setup(&opts.log_level, &opts.log_format) {
        eprintln!("failed to set up logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(opts).await {
        error!("{e:?}");
        std::process::exit(1);
    }
}
