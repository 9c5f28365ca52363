//! Logger Pipe (spec §4.4): formats a fixed-width line per event into the
//! log sink. Pure, no I/O against external state. Grounded on
//! `pkg/events/sinks/pipes/{logger,logger_print}.go`.

use std::sync::Once;

use chrono::Utc;
use event_exporter_core::prelude::*;
use tracing::debug;

use crate::event::EventRecord;
use crate::pipe::{
    Pipe,
    PipeKind,
};

const PRINT_HEAD: &str =
    "S   LST_S   FST_S   CNT   TYPE            KIND                NS                  OBJ                                     SRC                                               RES                                     MSG";
const IN_STATE: &str = "\u{2713}";
const OUT_STATE: &str = "\u{2717}";

fn format_source(source: &Option<corev1::EventSource>) -> String {
    match source {
        Some(s) if s.host.as_deref().is_some_and(|h| !h.is_empty()) => {
            format!("{} ({})", s.component.clone().unwrap_or_default(), s.host.clone().unwrap_or_default())
        },
        Some(s) => s.component.clone().unwrap_or_default(),
        None => String::new(),
    }
}

fn short_human_duration(secs: i64) -> String {
    match secs {
        s if s < 0 => "0s".into(),
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s if s < 86400 * 365 => format!("{}d", s / 86400),
        s => format!("{}y", s / (86400 * 365)),
    }
}

fn format_timestamp(t: &Option<metav1::Time>) -> String {
    match t {
        Some(t) => short_human_duration((Utc::now() - t.0).num_seconds()),
        None => String::new(),
    }
}

fn format_event(state: &str, event: &EventRecord) -> String {
    let involved = &event.involved_object;
    format!(
        "{:<4}{:<8}{:<8}{:<6}{:<16}{:<20}{:<20}{:<40.40}{:<50.50}{:<40.40}{}",
        state,
        format_timestamp(&event.last_timestamp),
        format_timestamp(&event.first_timestamp),
        event.count.unwrap_or(0),
        event.type_.as_deref().unwrap_or(""),
        involved.kind.as_deref().unwrap_or(""),
        involved.namespace.as_deref().unwrap_or(""),
        involved.name.as_deref().unwrap_or(""),
        format_source(&event.source),
        event.reason.as_deref().unwrap_or(""),
        event.message.as_deref().unwrap_or(""),
    )
}

fn show_head(bodies: impl IntoIterator<Item = String>) -> String {
    let mut out = String::from(PRINT_HEAD);
    for body in bodies {
        out.push('\n');
        out.push_str(&body);
    }
    out
}

pub struct LoggerPipe {
    started: Once,
}

impl Default for LoggerPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerPipe {
    pub fn new() -> Self {
        Self { started: Once::new() }
    }
}

#[async_trait::async_trait]
impl Pipe for LoggerPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Logger
    }

    async fn start(&self) -> EmptyResult {
        self.started.call_once(|| debug!("starting"));
        Ok(())
    }

    async fn stop(&self) {
        debug!("stopped");
    }

    async fn on_add(&self, event: &EventRecord) -> EmptyResult {
        debug!(operation = "OnAdd", "{}", show_head([format_event(IN_STATE, event)]));
        Ok(())
    }

    async fn on_update(&self, old: &EventRecord, new: &EventRecord) -> EmptyResult {
        debug!(operation = "OnUpdate", "{}", show_head([format_event(OUT_STATE, old), format_event(IN_STATE, new)]));
        Ok(())
    }

    async fn on_delete(&self, event: &EventRecord) -> EmptyResult {
        debug!(operation = "OnDelete", "{}", show_head([format_event(OUT_STATE, event)]));
        Ok(())
    }

    async fn on_list(&self, events: &[EventRecord]) -> EmptyResult {
        if !events.is_empty() {
            let bodies: Vec<String> = events.iter().map(|e| format_event(IN_STATE, e)).collect();
            debug!(operation = "OnList", "{}", show_head(bodies));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use event_exporter_testutils::events::fake_event;

    use super::*;

    #[tokio::test]
    async fn start_is_idempotent() {
        let pipe = LoggerPipe::new();
        pipe.start().await.unwrap();
        pipe.start().await.unwrap();
    }

    #[tokio::test]
    async fn on_add_never_errors() {
        let pipe = LoggerPipe::new();
        let event = fake_event("u1", "Pod", "ns", "p");
        pipe.on_add(&event).await.unwrap();
    }
}
