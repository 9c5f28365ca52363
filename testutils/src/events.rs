use event_exporter_core::prelude::*;
use rstest::fixture;

use crate::constants::*;

/// A minimally-populated event for a given involved object, with enough
/// fields set that the document encoder and TTL store tests have something
/// to chew on.
#[fixture]
pub fn fake_event(
    #[default("uid-1")] uid: &str,
    #[default("Pod")] involved_kind: &str,
    #[default(TEST_NAMESPACE)] namespace: &str,
    #[default("pod-a")] name: &str,
) -> corev1::Event {
    let uid = (!uid.is_empty()).then(|| uid.to_string());
    corev1::Event {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.into()),
            uid,
            ..Default::default()
        },
        involved_object: corev1::ObjectReference {
            kind: Some(involved_kind.into()),
            namespace: Some(namespace.into()),
            name: Some(name.into()),
            ..Default::default()
        },
        reason: Some("TestReason".into()),
        message: Some("a test event".into()),
        type_: Some("Normal".into()),
        source: Some(corev1::EventSource { component: Some("kubelet".into()), host: Some("node-a".into()) }),
        count: Some(1),
        ..Default::default()
    }
}

#[fixture]
pub fn fake_pod(#[default("pod-a")] name: &str, #[default(TEST_NAMESPACE)] namespace: &str) -> corev1::Pod {
    corev1::Pod {
        metadata: metav1::ObjectMeta { name: Some(name.into()), namespace: Some(namespace.into()), ..Default::default() },
        ..Default::default()
    }
}

#[fixture]
pub fn fake_node(#[default("node-a")] name: &str) -> corev1::Node {
    corev1::Node { metadata: metav1::ObjectMeta { name: Some(name.into()), ..Default::default() }, ..Default::default() }
}
