//! Sink Fan-out (C6, spec §4.6). Grounded directly on
//! `pkg/events/sinks/sink.go`'s `DefaultSink`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use event_exporter_core::constants::SINK_START_TIMEOUT_SECS;
use event_exporter_core::prelude::*;
use tokio::task::JoinSet;
use tracing::*;

use crate::event::EventRecord;
use crate::pipe::{
    Pipe,
    PipeKind,
};
use crate::ttl_store::StoreHandler;
use crate::watcher::EventHandler;

/// Owns the configured pipe set for one cluster and fans notifications out
/// to them either sequentially (fail-fast) or in parallel (best-effort).
/// Built once; the pipe map is read-only thereafter (spec §5 "the pipe map
/// inside the sink is read-only after construction").
pub struct Sink {
    pipes: BTreeMap<PipeKind, Arc<dyn Pipe>>,
    parallel: bool,
}

impl Sink {
    /// De-duplicates by [`PipeKind`] and sorts for deterministic start order
    /// (spec §4.6: "enforce this in the builder by de-duplicating the
    /// requested pipe set and sorting it for deterministic construction
    /// order").
    pub fn new(pipes: Vec<Arc<dyn Pipe>>, parallel: bool) -> Self {
        let pipes = pipes.into_iter().map(|p| (p.kind(), p)).collect();
        Self { pipes, parallel }
    }

    /// Starts every pipe, then spawns a task that awaits `stop` and tears
    /// every pipe down in turn. Bounded by a 30s umbrella deadline (spec
    /// §4.6 / §5). The returned handle resolves once every pipe has finished
    /// draining; callers that need the teardown bounded by a grace period
    /// must join it themselves.
    pub async fn run(self: Arc<Self>, stop: tokio_util::sync::CancellationToken) -> anyhow::Result<tokio::task::JoinHandle<()>> {
        let start = async {
            debug!("prepare pipes");
            for (kind, pipe) in &self.pipes {
                pipe.start().await.map_err(|e| anyhow::anyhow!("{} pipe failed to start: {e}", kind.as_str()))?;
            }
            debug!("running pipes");
            Ok::<_, anyhow::Error>(())
        };

        tokio::time::timeout(Duration::from_secs(SINK_START_TIMEOUT_SECS), start)
            .await
            .map_err(|_| anyhow::anyhow!("timeout on pipes starting"))??;

        let sink = self.clone();
        let teardown = tokio::spawn(async move {
            stop.cancelled().await;
            debug!("stopping pipes");
            for pipe in sink.pipes.values() {
                pipe.stop().await;
            }
            debug!("stopped pipes");
        });

        Ok(teardown)
    }

    /// Runs one fallible call against every pipe. `make_fut` must produce an
    /// owned (`'static`) future per pipe so the parallel branch can hand it
    /// to a [`JoinSet`] without borrowing from `self` or the caller's event
    /// data; sequential dispatch just drives the same futures in turn.
    async fn dispatch<F, Fut>(&self, make_fut: F)
    where
        F: Fn(Arc<dyn Pipe>) -> Fut,
        Fut: std::future::Future<Output = EmptyResult> + Send + 'static,
    {
        if self.parallel {
            let mut set = JoinSet::new();
            for (kind, pipe) in &self.pipes {
                let kind = *kind;
                set.spawn(make_fut(pipe.clone()).await_with_label(kind));
            }
            while set.join_next().await.is_some() {}
        } else {
            for (kind, pipe) in &self.pipes {
                if let Err(e) = make_fut(pipe.clone()).await {
                    error!("{} error occurred: {e}", kind.as_str());
                    break;
                }
            }
        }
    }
}

/// Wraps a pipe future so its error, if any, is logged with the owning
/// pipe's kind rather than propagated, and the join handle always succeeds.
trait LabelledDispatch: std::future::Future<Output = EmptyResult> + Sized {
    fn await_with_label(self, kind: PipeKind) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
}

impl<T> LabelledDispatch for T
where
    T: std::future::Future<Output = EmptyResult> + Send + 'static,
{
    fn await_with_label(self, kind: PipeKind) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.await {
                error!("{} error occurred: {e}", kind.as_str());
            }
        })
    }
}

#[async_trait::async_trait]
impl StoreHandler<EventRecord> for Sink {
    async fn on_add(&self, obj: &EventRecord) -> EmptyResult {
        let obj = obj.clone();
        self.dispatch(move |pipe| {
            let obj = obj.clone();
            async move { pipe.on_add(&obj).await }
        })
        .await;
        Ok(())
    }

    async fn on_update(&self, old: &EventRecord, new: &EventRecord) -> EmptyResult {
        let old = old.clone();
        let new = new.clone();
        self.dispatch(move |pipe| {
            let old = old.clone();
            let new = new.clone();
            async move { pipe.on_update(&old, &new).await }
        })
        .await;
        Ok(())
    }

    async fn on_delete(&self, obj: &EventRecord) -> EmptyResult {
        let obj = obj.clone();
        self.dispatch(move |pipe| {
            let obj = obj.clone();
            async move { pipe.on_delete(&obj).await }
        })
        .await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventHandler for Sink {
    async fn on_list(&self, events: &[EventRecord]) -> EmptyResult {
        let events = events.to_vec();
        self.dispatch(move |pipe| {
            let events = events.clone();
            async move { pipe.on_list(&events).await }
        })
        .await;
        Ok(())
    }
}

/// Lets the [`Supervisor`](crate::supervisor::Supervisor) hand the same
/// `Arc<Sink>` it started to the watcher as its handler.
#[async_trait::async_trait]
impl StoreHandler<EventRecord> for Arc<Sink> {
    async fn on_add(&self, obj: &EventRecord) -> EmptyResult {
        Sink::on_add(self, obj).await
    }

    async fn on_update(&self, old: &EventRecord, new: &EventRecord) -> EmptyResult {
        Sink::on_update(self, old, new).await
    }

    async fn on_delete(&self, obj: &EventRecord) -> EmptyResult {
        Sink::on_delete(self, obj).await
    }
}

#[async_trait::async_trait]
impl EventHandler for Arc<Sink> {
    async fn on_list(&self, events: &[EventRecord]) -> EmptyResult {
        Sink::on_list(self, events).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };
    use std::sync::Mutex;

    use event_exporter_testutils::events::fake_event;

    use super::*;

    struct RecordingPipe {
        kind: PipeKind,
        fail: bool,
        adds: AtomicUsize,
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingPipe {
        fn new(kind: PipeKind, fail: bool) -> Arc<Self> {
            Arc::new(Self { kind, fail, adds: AtomicUsize::new(0), calls: Mutex::new(vec![]) })
        }
    }

    #[async_trait::async_trait]
    impl Pipe for RecordingPipe {
        fn kind(&self) -> PipeKind {
            self.kind
        }

        async fn start(&self) -> EmptyResult {
            Ok(())
        }

        async fn stop(&self) {}

        async fn on_add(&self, _event: &EventRecord) -> EmptyResult {
            self.calls.lock().unwrap().push("add");
            self.adds.fetch_add(1, Ordering::SeqCst);
            if self.fail { anyhow::bail!("boom") } else { Ok(()) }
        }

        async fn on_update(&self, _old: &EventRecord, _new: &EventRecord) -> EmptyResult {
            self.calls.lock().unwrap().push("update");
            Ok(())
        }

        async fn on_delete(&self, _event: &EventRecord) -> EmptyResult {
            self.calls.lock().unwrap().push("delete");
            Ok(())
        }

        async fn on_list(&self, _events: &[EventRecord]) -> EmptyResult {
            self.calls.lock().unwrap().push("list");
            Ok(())
        }
    }

    #[tokio::test]
    async fn sequential_dispatch_stops_at_first_error() {
        let failing = RecordingPipe::new(PipeKind::Logger, true);
        let healthy = RecordingPipe::new(PipeKind::DocumentStore, false);
        let sink = Sink::new(vec![failing.clone(), healthy.clone()], false);

        let event = fake_event("u1", "Pod", "ns", "p");
        sink.on_add(&event).await.unwrap();

        assert_eq!(failing.adds.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.adds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parallel_dispatch_runs_every_pipe_despite_errors() {
        let failing = RecordingPipe::new(PipeKind::Logger, true);
        let healthy = RecordingPipe::new(PipeKind::DocumentStore, false);
        let sink = Sink::new(vec![failing.clone(), healthy.clone()], true);

        let event = fake_event("u1", "Pod", "ns", "p");
        sink.on_add(&event).await.unwrap();

        assert_eq!(failing.adds.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.adds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_pipe_kinds_collapse_to_one_entry() {
        let first = RecordingPipe::new(PipeKind::Logger, false);
        let second = RecordingPipe::new(PipeKind::Logger, false);
        let sink = Sink::new(vec![first.clone(), second.clone()], false);

        let event = fake_event("u1", "Pod", "ns", "p");
        sink.on_add(&event).await.unwrap();

        assert_eq!(first.adds.load(Ordering::SeqCst) + second.adds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_delete_dispatches_to_every_pipe() {
        let logger = RecordingPipe::new(PipeKind::Logger, false);
        let store = RecordingPipe::new(PipeKind::DocumentStore, false);
        let sink = Sink::new(vec![logger.clone(), store.clone()], false);

        let event = fake_event("u1", "Pod", "ns", "p");
        sink.on_delete(&event).await.unwrap();

        assert_eq!(logger.calls.lock().unwrap().as_slice(), ["delete"]);
        assert_eq!(store.calls.lock().unwrap().as_slice(), ["delete"]);
    }
}
