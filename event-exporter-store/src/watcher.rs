//! Event Watcher (C3, spec §4.3).
//!
//! Binds a `kube::runtime::watcher` stream over `Api<Event>` (all
//! namespaces) to a [`TtlStore`], accumulating the `InitApply` batch between
//! `Init` and `InitDone` and replaying it through `on_list` before it lands
//! in the store, grounded on `sk-store`'s `watchers/pod_watcher.rs`
//! (`EventHandler::applied`/`deleted`) and its `Init`/`InitApply`/
//! `InitDone`/`Apply`/`Delete` event lifecycle (see
//! `sk-store/src/watchers/tests/mod.rs` and
//! `sk-store/src/tests/import_export_test.rs`), and on `pkg/events/watcher.go`'s
//! list-then-watch wiring.
//!
//! `kube`'s reflector stream already relists on a stale resourceVersion;
//! the configured resync period additionally forces a fresh list on a
//! timer, the Rust analog of `client-go`'s periodic reflector resync that
//! `kube::runtime::watcher` does not perform on its own.

use std::time::Duration;

use event_exporter_core::prelude::*;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::runtime::watcher::Event;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::event::EventRecord;
use crate::ttl_store::{
    StoreHandler,
    TtlStore,
};

/// Receives the full initial (or relisted) batch before it replaces the
/// store's contents (spec §4.3: "invokes an `OnList(EventList)` callback
/// before returning").
#[async_trait::async_trait]
pub trait EventHandler: StoreHandler<EventRecord> {
    async fn on_list(&self, events: &[EventRecord]) -> EmptyResult;
}

pub struct EventWatcherConfig {
    pub resync_period: Duration,
    pub storage_ttl: Duration,
}

pub struct EventWatcher<H> {
    api: kube::Api<EventRecord>,
    config: EventWatcherConfig,
    handler: H,
    store: TtlStore<EventRecord>,
    init_batch: Vec<EventRecord>,
}

impl<H: EventHandler> EventWatcher<H> {
    pub fn new(client: kube::Client, config: EventWatcherConfig, handler: H) -> Self {
        let store = TtlStore::new(config.storage_ttl.as_secs() as i64, Box::new(clockabilly::UtcClock));
        Self { api: kube::Api::all(client), config, handler, store, init_batch: Vec::new() }
    }

    /// Runs list+watch until `stop` is cancelled, at which point the
    /// underlying reflector stream is dropped (spec §4.3: "the watcher runs
    /// until a termination channel is closed; on termination, the
    /// underlying reflector stops").
    pub async fn run(mut self, stop: CancellationToken) {
        loop {
            let mut stream = watcher(self.api.clone(), watcher::Config::default()).boxed();
            let resync = tokio::time::sleep(self.config.resync_period);
            tokio::pin!(resync);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        info!("event watcher stopping");
                        return;
                    },
                    _ = &mut resync => {
                        debug!("resync period elapsed, restarting event reflector");
                        break;
                    },
                    next = stream.next() => {
                        match next {
                            Some(Ok(evt)) => self.handle_event(evt).await,
                            Some(Err(e)) => error!("event watcher received error on stream: {e}"),
                            None => break,
                        }
                    },
                }
            }
        }
    }

    async fn handle_event(&mut self, evt: Event<EventRecord>) {
        match evt {
            Event::Init => {
                self.init_batch.clear();
            },
            Event::InitApply(event) => {
                self.init_batch.push(event);
            },
            Event::InitDone => {
                let events = std::mem::take(&mut self.init_batch);
                if let Err(e) = self.handler.on_list(&events).await {
                    error!("on_list callback failed: {e}");
                }
                let items = events.into_iter().map(|e| (e.namespaced_name(), e)).collect();
                self.store.replace_all(items);
            },
            Event::Apply(event) => {
                let key = event.namespaced_name();
                if let Err(e) = self.store.add(&key, event, &self.handler).await {
                    error!("applied event {key} could not be stored: {e}");
                }
            },
            Event::Delete(event) => {
                let key = event.namespaced_name();
                if let Err(e) = self.store.delete(&key, event, &self.handler).await {
                    error!("deleted event {key} could not be removed from store: {e}");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assertables::*;
    use event_exporter_testutils::events::fake_event;

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        added: Mutex<Vec<String>>,
        listed: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl StoreHandler<EventRecord> for RecordingHandler {
        async fn on_add(&self, obj: &EventRecord) -> EmptyResult {
            self.added.lock().unwrap().push(obj.namespaced_name());
            Ok(())
        }

        async fn on_update(&self, _old: &EventRecord, _new: &EventRecord) -> EmptyResult {
            Ok(())
        }

        async fn on_delete(&self, _obj: &EventRecord) -> EmptyResult {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl EventHandler for RecordingHandler {
        async fn on_list(&self, events: &[EventRecord]) -> EmptyResult {
            *self.listed.lock().unwrap() += events.len();
            Ok(())
        }
    }

    fn fake_client() -> kube::Client {
        let config = kube::Config::new(http::Uri::from_static("http://127.0.0.1:0"));
        kube::Client::try_from(config).unwrap()
    }

    fn watcher_with_handler(handler: RecordingHandler) -> EventWatcher<RecordingHandler> {
        EventWatcher {
            api: kube::Api::all(fake_client()),
            config: EventWatcherConfig { resync_period: Duration::from_secs(3600), storage_ttl: Duration::from_secs(3600) },
            handler,
            store: TtlStore::new(3600, Box::new(clockabilly::UtcClock)),
            init_batch: Vec::new(),
        }
    }

    #[tokio::test]
    async fn init_batch_invokes_on_list_not_on_add() {
        let mut watcher = watcher_with_handler(RecordingHandler::default());
        let e1 = fake_event("u1", "Pod", "ns", "p1");
        let e2 = fake_event("u2", "Pod", "ns", "p2");

        watcher.handle_event(Event::Init).await;
        watcher.handle_event(Event::InitApply(e1)).await;
        watcher.handle_event(Event::InitApply(e2)).await;
        watcher.handle_event(Event::InitDone).await;

        assert_eq!(*watcher.handler.listed.lock().unwrap(), 2);
        assert!(watcher.handler.added.lock().unwrap().is_empty());
        assert_len_eq_x!(&watcher.store, 2);
    }

    #[tokio::test]
    async fn apply_after_init_done_invokes_on_add() {
        let mut watcher = watcher_with_handler(RecordingHandler::default());
        watcher.handle_event(Event::Init).await;
        watcher.handle_event(Event::InitDone).await;

        watcher.handle_event(Event::Apply(fake_event("u1", "Pod", "ns", "p1"))).await;

        assert_eq!(watcher.handler.added.lock().unwrap().as_slice(), ["ns/p1".to_string()]);
        assert_len_eq_x!(&watcher.store, 1);
    }
}
