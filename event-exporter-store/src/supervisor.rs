//! Exporter Supervisor (C7, spec §4.7).
//!
//! Wires one cluster's pipes, [`Sink`], and [`EventWatcher`] together and
//! owns their lifetime as a unit, grounded on `pkg/exporters/event.go`'s
//! `EventExporter`/`newEventExporter`.

use std::sync::Arc;
use std::time::Duration;

use event_exporter_core::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::pipe::{
    Pipe,
    PipeKind,
};
use crate::pipes::{
    DocumentStoreConfig,
    DocumentStorePipe,
    LoggerPipe,
};
use crate::sink::Sink;
use crate::watcher::{
    EventWatcher,
    EventWatcherConfig,
};

/// Everything needed to build one cluster's supervisor, mirroring
/// `EventExporterConfig` in the original.
pub struct SupervisorConfig {
    pub kubernetes_host: String,
    pub resync_period: Duration,
    pub storage_ttl: Duration,
    pub use_pipes: Vec<String>,
    pub pipes_parallel: bool,
    /// Debug-level logging gates the Logger pipe's inclusion (spec §4.7:
    /// "the logger pipe is only wired in when the configured log level is
    /// debug or lower, matching the original's `logrus.GetLevel() ==
    /// DebugLevel` gate").
    pub debug_logging: bool,
    /// Required only when `use_pipes` requests the `mongodb` pipe (spec §6:
    /// "the connect-URI env var is required for mongodb pipe").
    pub document_store: Option<DocumentStoreConfig>,
}

/// Owns one cluster's watch-to-sink pipeline end-to-end. `start` launches
/// the sink and the watcher loop; `stop` cancels both and waits for the
/// watcher task and the sink's pipe teardown to finish (spec §4.7: "tears
/// down the watcher and then the sink").
pub struct Supervisor {
    kubernetes_host: String,
    stop: CancellationToken,
    watcher_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    sink_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

fn build_pipes(config: &SupervisorConfig, kube_client: &kube::Client) -> anyhow::Result<Vec<Arc<dyn Pipe>>> {
    if config.use_pipes.is_empty() {
        anyhow::bail!("failed to create sink, there aren't any pipes enabled");
    }

    let mut requested: Vec<PipeKind> = config.use_pipes.iter().map(|p| p.parse()).collect::<anyhow::Result<_>>()?;
    requested.sort();
    requested.dedup();

    let mut pipes: Vec<Arc<dyn Pipe>> = Vec::with_capacity(requested.len());
    for kind in requested {
        match kind {
            PipeKind::Logger => {
                if config.debug_logging {
                    pipes.push(Arc::new(LoggerPipe::new()));
                }
            },
            PipeKind::DocumentStore => {
                let document_store = config
                    .document_store
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("mongodb pipe requested but document-store config is missing"))?;
                pipes.push(Arc::new(DocumentStorePipe::new(config.kubernetes_host.clone(), kube_client.clone(), document_store)));
            },
        }
    }
    Ok(pipes)
}

impl Supervisor {
    pub async fn new(kube_client: kube::Client, config: SupervisorConfig) -> anyhow::Result<Self> {
        let kubernetes_host = config.kubernetes_host.clone();
        let pipes_parallel = config.pipes_parallel;
        let resync_period = config.resync_period;
        let storage_ttl = config.storage_ttl;

        let pipes = build_pipes(&config, &kube_client)?;
        let sink = Arc::new(Sink::new(pipes, pipes_parallel));

        let stop = CancellationToken::new();
        let sink_task = sink.clone().run(stop.clone()).await.map_err(|e| anyhow::anyhow!("fail to run sink: {e}"))?;

        debug!(kubernetes_host, "starting");
        let watcher = EventWatcher::new(kube_client, EventWatcherConfig { resync_period, storage_ttl }, sink);
        let watcher_stop = stop.clone();
        let watcher_task = tokio::spawn(async move { watcher.run(watcher_stop).await });

        Ok(Self {
            kubernetes_host,
            stop,
            watcher_task: tokio::sync::Mutex::new(Some(watcher_task)),
            sink_task: tokio::sync::Mutex::new(Some(sink_task)),
        })
    }

    /// Cancels the watcher and every pipe, then waits for the watcher task
    /// and the sink's draining teardown to finish (spec §4.7: "`Stop`
    /// cancels the supervisor's scope and waits for its watcher to exit
    /// before returning", and the sink's own drain-before-close contract).
    pub async fn stop(&self) {
        self.stop.cancel();
        if let Some(task) = self.watcher_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("watcher task panicked while stopping: {e}");
            }
        }
        if let Some(task) = self.sink_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("sink teardown task panicked while stopping: {e}");
            }
        }
        debug!(kubernetes_host = %self.kubernetes_host, "stopped");
    }
}
