//! Pipe (C4, spec §4.4).
//!
//! A sink-plugin contract with lifecycle (`start`/`stop`) and per-notification
//! handlers, grounded on `pkg/events/sinks/pipe.go`'s `Pipe` interface and on
//! `lib/rust/watch/pod_watcher.rs`'s handler-trait shape.

use event_exporter_core::prelude::*;

use crate::event::EventRecord;

/// A named sink-plugin kind, used as the dedup/sort key by the [`crate::sink::Sink`]
/// (spec §4.6: "a map from pipe-kind tag to pipe instance").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PipeKind {
    Logger,
    DocumentStore,
}

impl PipeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipeKind::Logger => "logger",
            PipeKind::DocumentStore => "mongodb",
        }
    }
}

impl std::str::FromStr for PipeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logger" => Ok(PipeKind::Logger),
            "mongodb" => Ok(PipeKind::DocumentStore),
            other => anyhow::bail!("unknown pipe kind: {other}"),
        }
    }
}

/// Contract implemented by each concrete sink plugin (Logger, Document-Store).
///
/// `start` is idempotent: implementations must guard so that a second call
/// returns the outcome of the first rather than reinitializing. `stop` is
/// draining: it must not return until all work accepted before the call has
/// been attempted.
#[async_trait::async_trait]
pub trait Pipe: Send + Sync {
    fn kind(&self) -> PipeKind;

    async fn start(&self) -> EmptyResult;
    async fn stop(&self);

    async fn on_add(&self, event: &EventRecord) -> EmptyResult;
    async fn on_update(&self, old: &EventRecord, new: &EventRecord) -> EmptyResult;
    async fn on_delete(&self, event: &EventRecord) -> EmptyResult;
    async fn on_list(&self, events: &[EventRecord]) -> EmptyResult;
}
