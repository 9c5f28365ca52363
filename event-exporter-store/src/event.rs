use event_exporter_core::prelude::*;

/// The unit of work flowing through the pipeline (spec §3 "Event Record").
/// Rather than re-deriving a parallel struct, we operate directly on the
/// cluster's own event type, the same way `event-exporter-core`'s Kubernetes
/// helpers operate on `corev1::Pod`/`corev1::Node` directly.
pub type EventRecord = corev1::Event;

/// The kinds of involved-object the document-store pipe enriches and
/// persists (spec §4.5 "per-notification filtering"). Everything else is
/// logged at debug and dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvolvedKind {
    Pod,
    Node,
    Other,
}

impl InvolvedKind {
    pub fn of(event: &EventRecord) -> Self {
        match event.involved_object.kind.as_deref() {
            Some("Pod") => InvolvedKind::Pod,
            Some("Node") => InvolvedKind::Node,
            _ => InvolvedKind::Other,
        }
    }
}

/// Extracts the stable identity (spec §3: "a stable unique identity") an
/// event is keyed by. Events without a uid are a schema error on the
/// producer side (spec §7) and must be dropped before queueing.
pub fn event_uid(event: &EventRecord) -> Option<&str> {
    event.metadata.uid.as_deref().filter(|uid| !uid.is_empty())
}

#[cfg(test)]
mod tests {
    use event_exporter_testutils::events::fake_event;

    use super::*;

    #[test]
    fn involved_kind_classifies_pod_node_and_other() {
        assert_eq!(InvolvedKind::of(&fake_event("u1", "Pod", "default", "p")), InvolvedKind::Pod);
        assert_eq!(InvolvedKind::of(&fake_event("u2", "Node", "", "n")), InvolvedKind::Node);
        assert_eq!(InvolvedKind::of(&fake_event("u3", "ConfigMap", "default", "cm")), InvolvedKind::Other);
    }

    #[test]
    fn event_uid_rejects_blank_identity() {
        let mut event = fake_event("", "Pod", "default", "p");
        assert_eq!(event_uid(&event), None);
        event.metadata.uid = Some("u1".into());
        assert_eq!(event_uid(&event), Some("u1"));
    }
}
