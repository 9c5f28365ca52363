//! Document Encoder (C1, spec §4.1).
//!
//! Explicit, non-reflective translation of an [`EventRecord`] into the
//! store's native `bson::Document`, dropping nil/empty elements so that
//! equality comparison is meaningful (spec §3 Document invariant (b)).
//! Grounded on `pkg/events/sinks/pipes/mongodb_bson.go`'s element-by-element
//! builder, rewritten as idiomatic `Into<bson::Bson>` conversions instead of
//! nil-pointer checks per elements.

use bson::{Bson, Document};
use event_exporter_core::constants::{ATTACH_DOC_FIELD, ATTACH_JSON_FIELD};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, OwnerReference, Time};

use crate::event::EventRecord;

/// What to embed alongside an encoded event when enrichment applies (spec
/// §4.1, §4.5 "Enrichment"). Exactly one of `Json`/`Doc` is ever produced for
/// a given document, selected by the `raw-attach` configuration flag.
pub enum Attachment<'a> {
    Json(&'a str),
    Doc(Document),
}

fn put_str(doc: &mut Document, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        if !v.is_empty() {
            doc.insert(key, v.clone());
        }
    }
}

fn put_i32(doc: &mut Document, key: &str, value: &Option<i32>) {
    if let Some(v) = value {
        if *v != 0 {
            doc.insert(key, *v);
        }
    }
}

fn put_i64(doc: &mut Document, key: &str, value: &Option<i64>) {
    if let Some(v) = value {
        if *v != 0 {
            doc.insert(key, *v);
        }
    }
}

fn put_time(doc: &mut Document, key: &str, value: &Option<Time>) {
    if let Some(t) = value {
        doc.insert(key, chrono_to_bson(t.0));
    }
}

fn put_micro_time(doc: &mut Document, key: &str, value: &Option<MicroTime>) {
    if let Some(t) = value {
        doc.insert(key, chrono_to_bson(t.0));
    }
}

fn chrono_to_bson(dt: chrono::DateTime<chrono::Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_chrono(dt))
}

fn put_string_map(doc: &mut Document, key: &str, value: &Option<std::collections::BTreeMap<String, String>>) {
    if let Some(map) = value {
        if !map.is_empty() {
            let mut sub = Document::new();
            for (k, v) in map {
                sub.insert(k, v.clone());
            }
            doc.insert(key, sub);
        }
    }
}

fn put_string_array(doc: &mut Document, key: &str, value: &Option<Vec<String>>) {
    if let Some(arr) = value {
        if !arr.is_empty() {
            doc.insert(key, arr.clone());
        }
    }
}

fn owner_references_to_bson(value: &Option<Vec<OwnerReference>>) -> Option<Bson> {
    let refs = value.as_ref()?;
    if refs.is_empty() {
        return None;
    }
    let arr: Vec<Bson> = refs
        .iter()
        .map(|r| {
            let mut d = Document::new();
            d.insert("apiVersion", r.api_version.clone());
            d.insert("kind", r.kind.clone());
            d.insert("name", r.name.clone());
            d.insert("uid", r.uid.clone());
            if let Some(c) = r.controller {
                d.insert("controller", c);
            }
            if let Some(b) = r.block_owner_deletion {
                d.insert("blockOwnerDeletion", b);
            }
            Bson::Document(d)
        })
        .collect();
    Some(Bson::Array(arr))
}

fn object_meta_to_bson(meta: &ObjectMeta) -> Document {
    let mut d = Document::new();
    put_str(&mut d, "name", &meta.name);
    put_str(&mut d, "generateName", &meta.generate_name);
    put_str(&mut d, "namespace", &meta.namespace);
    put_str(&mut d, "uid", &meta.uid);
    put_str(&mut d, "resourceVersion", &meta.resource_version);
    put_i64(&mut d, "generation", &meta.generation);
    put_time(&mut d, "creationTimestamp", &meta.creation_timestamp);
    put_time(&mut d, "deletionTimestamp", &meta.deletion_timestamp);
    put_i64(&mut d, "deletionGracePeriodSeconds", &meta.deletion_grace_period_seconds);
    put_string_map(&mut d, "labels", &meta.labels);
    put_string_map(&mut d, "annotations", &meta.annotations);
    if let Some(owner_refs) = owner_references_to_bson(&meta.owner_references) {
        d.insert("ownerReferences", owner_refs);
    }
    put_string_array(&mut d, "finalizers", &meta.finalizers);
    d
}

fn object_reference_to_bson(r: &k8s_openapi::api::core::v1::ObjectReference) -> Document {
    let mut d = Document::new();
    put_str(&mut d, "kind", &r.kind);
    put_str(&mut d, "namespace", &r.namespace);
    put_str(&mut d, "name", &r.name);
    put_str(&mut d, "uid", &r.uid);
    put_str(&mut d, "apiVersion", &r.api_version);
    put_str(&mut d, "resourceVersion", &r.resource_version);
    put_str(&mut d, "fieldPath", &r.field_path);
    d
}

fn event_source_to_bson(s: &k8s_openapi::api::core::v1::EventSource) -> Document {
    let mut d = Document::new();
    put_str(&mut d, "component", &s.component);
    put_str(&mut d, "host", &s.host);
    d
}

fn event_series_to_bson(s: &k8s_openapi::api::core::v1::EventSeries) -> Document {
    let mut d = Document::new();
    put_i32(&mut d, "count", &s.count);
    put_micro_time(&mut d, "lastObservedTime", &s.last_observed_time);
    d
}

/// Encodes a single event record into the store's canonical document form.
/// Two encodings of semantically-identical events compare equal under this
/// encoding (spec §4.1 "Guarantees"), which the upsert path relies on to
/// skip no-op writes.
pub fn encode_event(event: &EventRecord, attachment: Option<Attachment<'_>>) -> Document {
    let mut doc = Document::new();

    // corev1::Event carries no per-instance `kind`/`apiVersion` (those live on
    // the request's TypeMeta, not the stored object), so the schema in spec
    // §6 is satisfied minus those two constant-valued fields.
    put_str(&mut doc, "type", &event.type_);

    doc.insert("metadata", object_meta_to_bson(&event.metadata));
    doc.insert("involvedObject", object_reference_to_bson(&event.involved_object));
    put_str(&mut doc, "reason", &event.reason);
    put_str(&mut doc, "message", &event.message);
    if let Some(source) = &event.source {
        doc.insert("source", event_source_to_bson(source));
    }
    put_time(&mut doc, "firstTimestamp", &event.first_timestamp);
    put_time(&mut doc, "lastTimestamp", &event.last_timestamp);
    put_i32(&mut doc, "count", &event.count);
    put_micro_time(&mut doc, "eventTime", &event.event_time);
    if let Some(series) = &event.series {
        doc.insert("series", event_series_to_bson(series));
    }
    put_str(&mut doc, "action", &event.action);
    if let Some(related) = &event.related {
        doc.insert("related", object_reference_to_bson(related));
    }
    put_str(&mut doc, "reportingComponent", &event.reporting_component);
    put_str(&mut doc, "reportingInstance", &event.reporting_instance);

    match attachment {
        Some(Attachment::Json(raw)) => {
            doc.insert(ATTACH_JSON_FIELD, raw);
        },
        Some(Attachment::Doc(sub)) => {
            doc.insert(ATTACH_DOC_FIELD, sub);
        },
        None => {},
    }

    doc
}

/// Projects out the fields the OnList equality check ignores (spec §4.5
/// OnList path / §9 Open Question): `_id` and whichever attachment field is
/// present.
pub fn strip_incomparable_fields(mut doc: Document) -> Document {
    doc.remove("_id");
    doc.remove(ATTACH_JSON_FIELD);
    doc.remove(ATTACH_DOC_FIELD);
    doc
}

#[cfg(test)]
mod tests {
    use event_exporter_testutils::events::fake_event;

    use super::*;

    #[test]
    fn encoding_omits_absent_optional_fields() {
        let event = fake_event("u1", "Pod", "ns", "p");
        let doc = encode_event(&event, None);
        assert!(!doc.contains_key("series"));
        assert!(!doc.contains_key(ATTACH_JSON_FIELD));
        assert!(!doc.contains_key(ATTACH_DOC_FIELD));
    }

    #[test]
    fn encoding_is_idempotent_for_identical_inputs() {
        let event = fake_event("u1", "Pod", "ns", "p");
        let a = encode_event(&event, None);
        let b = encode_event(&event, None);
        assert_eq!(a, b);
    }

    #[test]
    fn raw_attach_and_doc_attach_are_mutually_exclusive() {
        let event = fake_event("u1", "Pod", "ns", "p");
        let json_doc = encode_event(&event, Some(Attachment::Json("{}")));
        assert!(json_doc.contains_key(ATTACH_JSON_FIELD));
        assert!(!json_doc.contains_key(ATTACH_DOC_FIELD));

        let sub_doc = encode_event(&event, Some(Attachment::Doc(Document::new())));
        assert!(sub_doc.contains_key(ATTACH_DOC_FIELD));
        assert!(!sub_doc.contains_key(ATTACH_JSON_FIELD));
    }
}
