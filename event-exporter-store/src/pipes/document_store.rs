//! Document-Store Pipe (C5, spec §4.5).
//!
//! MongoDB-backed sink: enrichment fetch on add, a bounded queue absorbing
//! bursts, and a single upsert worker. Grounded on
//! `pkg/events/sinks/pipes/mongodb.go`'s `mongodbPipe` (`eventChan` +
//! `eventChanStop` + `dealEventChan`/`dealingEvent`), translated onto
//! `tokio::sync::{mpsc, RwLock, oneshot}` per spec §9's coroutine note.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bson::{
    doc,
    Document,
};
use event_exporter_core::constants::*;
use event_exporter_core::k8s::collection_name_for_identity;
use event_exporter_core::prelude::*;
use mongodb::options::{
    FindOneAndUpdateOptions,
    IndexOptions,
};
use mongodb::{
    Client,
    Collection,
    IndexModel,
};
use tokio::sync::{
    mpsc,
    oneshot,
    Mutex,
    OnceCell,
    RwLock,
};
use tracing::*;

use crate::encode::{
    encode_event,
    strip_incomparable_fields,
    Attachment,
};
use crate::event::{
    event_uid,
    EventRecord,
    InvolvedKind,
};
use crate::pipe::{
    Pipe,
    PipeKind,
};

enum Operation {
    Add,
    Update,
    List,
}

struct QueueUnit {
    operation: Operation,
    document: Document,
}

struct Started {
    collection: Collection<Document>,
    client: Client,
    tx: mpsc::Sender<QueueUnit>,
    fence: RwLock<()>,
    stop: Mutex<Option<oneshot::Sender<oneshot::Sender<()>>>>,
    enable_json_attach: bool,
}

/// Constructor parameters read once at `Start` (spec §4.5 steps 1-3); kept
/// separate from environment globals so tests can inject values directly.
#[derive(Clone)]
pub struct DocumentStoreConfig {
    pub connect_uri: String,
    pub database_name: String,
    pub enable_json_attach: bool,
}

impl DocumentStoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let connect_uri = std::env::var(PIPE_MONGODB_CONNECT_URI_ENV_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("\"{PIPE_MONGODB_CONNECT_URI_ENV_VAR}\" env is required"))?;
        let database_name = std::env::var(PIPE_MONGODB_DATABASE_NAME_ENV_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_NAME.into());
        let enable_json_attach = std::env::var(PIPE_MONGODB_ENABLE_JSON_ATTACH_ENV_VAR)
            .ok()
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Ok(Self { connect_uri, database_name, enable_json_attach })
    }
}

pub struct DocumentStorePipe {
    kubernetes_host: String,
    kube_client: kube::Client,
    config: DocumentStoreConfig,
    started: OnceCell<Result<Arc<Started>, String>>,
}

impl DocumentStorePipe {
    pub fn new(kubernetes_host: String, kube_client: kube::Client, config: DocumentStoreConfig) -> Self {
        Self { kubernetes_host, kube_client, config, started: OnceCell::new() }
    }

    async fn init(&self) -> anyhow::Result<Arc<Started>> {
        if self.kubernetes_host.is_empty() {
            anyhow::bail!("blank cluster identity");
        }

        let client = Client::with_uri_str(&self.config.connect_uri)
            .await
            .map_err(|e| anyhow::anyhow!("MongoDB failed to create client: {e}"))?;
        let database = client.database(&self.config.database_name);
        debug!("using {} database", self.config.database_name);

        let collections_map = database.collection::<Document>(COLLECTIONS_MAP_COLLECTION);
        create_collections_map_indexes(&collections_map).await?;
        let collection_name = resolve_collection_name(&collections_map, &self.kubernetes_host).await?;
        debug!("using {collection_name} collection");

        let collection = database.collection::<Document>(&collection_name);
        create_event_collection_indexes(&collection).await?;

        let (tx, rx) = mpsc::channel(DOCUMENT_STORE_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(worker_loop(rx, stop_rx, collection.clone()));

        Ok(Arc::new(Started {
            collection,
            client,
            tx,
            fence: RwLock::new(()),
            stop: Mutex::new(Some(stop_tx)),
            enable_json_attach: self.config.enable_json_attach,
        }))
    }

    async fn started(&self) -> anyhow::Result<Arc<Started>> {
        match self.started.get_or_init(|| async { self.init().await.map_err(|e| e.to_string()) }).await {
            Ok(started) => Ok(started.clone()),
            Err(msg) => Err(anyhow::anyhow!("{msg}")),
        }
    }

    async fn enrich(&self, kind: InvolvedKind, namespace: &str, name: &str) -> anyhow::Result<serde_json::Value> {
        match kind {
            InvolvedKind::Pod => {
                let api: kube::Api<corev1::Pod> = kube::Api::namespaced(self.kube_client.clone(), namespace);
                let pod = api.get(name).await?;
                Ok(serde_json::to_value(pod)?)
            },
            InvolvedKind::Node => {
                let api: kube::Api<corev1::Node> = kube::Api::all(self.kube_client.clone());
                let node = api.get(name).await?;
                Ok(serde_json::to_value(node)?)
            },
            InvolvedKind::Other => unreachable!("caller filters to Pod/Node before enriching"),
        }
    }

    fn attachment_for<'a>(&self, enable_json_attach: bool, value: &'a serde_json::Value, raw: &'a mut Option<String>) -> Attachment<'a> {
        if enable_json_attach {
            *raw = Some(value.to_string());
            Attachment::Json(raw.as_deref().unwrap())
        } else {
            Attachment::Doc(bson::to_document(value).unwrap_or_default())
        }
    }
}

#[async_trait::async_trait]
impl Pipe for DocumentStorePipe {
    fn kind(&self) -> PipeKind {
        PipeKind::DocumentStore
    }

    async fn start(&self) -> EmptyResult {
        self.started().await?;
        Ok(())
    }

    async fn stop(&self) {
        let started = match self.started.get() {
            Some(Ok(s)) => s.clone(),
            _ => return,
        };

        debug!("stopping");
        // Fences producers: a writer here blocks until every in-flight
        // `on_add`/`on_update`/`on_list` call has released its `fence.read()`
        // guard (and thus has already sent its unit), and blocks new callers
        // from acquiring the read lock until the drain below finishes.
        let _fence = started.fence.write().await;
        let (done_tx, done_rx) = oneshot::channel();
        let stop_tx = started.stop.lock().await.take();
        if let Some(stop_tx) = stop_tx {
            if stop_tx.send(done_tx).is_ok() {
                let _ = done_rx.await;
            }
        }
        drop(_fence);
        started.client.clone().shutdown().await;
        debug!("stopped");
    }

    async fn on_add(&self, event: &EventRecord) -> EmptyResult {
        let started = self.started().await?;
        let _guard = started.fence.read().await;

        let kind = InvolvedKind::of(event);
        if kind == InvolvedKind::Other {
            debug!("ignoring the addition operation for {:?}", event.involved_object.kind);
            return Ok(());
        }
        let Some(namespace) = event.involved_object.namespace.clone() else {
            return Ok(());
        };
        let Some(name) = event.involved_object.name.clone() else {
            return Ok(());
        };

        let value = self.enrich(kind, &namespace, &name).await?;
        let mut raw = None;
        let attachment = self.attachment_for(started.enable_json_attach, &value, &mut raw);
        let document = match std::panic::catch_unwind(AssertUnwindSafe(|| encode_event(event, Some(attachment)))) {
            Ok(document) => document,
            Err(_) => anyhow::bail!("panic while encoding event {:?}", event_uid(event)),
        };

        started
            .tx
            .send(QueueUnit { operation: Operation::Add, document })
            .await
            .map_err(|_| anyhow::anyhow!("document-store queue closed"))?;
        Ok(())
    }

    async fn on_update(&self, _old: &EventRecord, new: &EventRecord) -> EmptyResult {
        let started = self.started().await?;
        let _guard = started.fence.read().await;

        if InvolvedKind::of(new) == InvolvedKind::Other {
            debug!("ignoring the updating operation for {:?}", new.involved_object.kind);
            return Ok(());
        }

        let document = match std::panic::catch_unwind(AssertUnwindSafe(|| encode_event(new, None))) {
            Ok(document) => document,
            Err(_) => anyhow::bail!("panic while encoding event {:?}", event_uid(new)),
        };
        started
            .tx
            .send(QueueUnit { operation: Operation::Update, document })
            .await
            .map_err(|_| anyhow::anyhow!("document-store queue closed"))?;
        Ok(())
    }

    async fn on_delete(&self, _event: &EventRecord) -> EmptyResult {
        debug!("ignoring the deletion operation");
        Ok(())
    }

    async fn on_list(&self, events: &[EventRecord]) -> EmptyResult {
        let started = self.started().await?;
        let _guard = started.fence.read().await;

        for event in events {
            if InvolvedKind::of(event) == InvolvedKind::Other {
                debug!("ignoring the listing operation for {:?}", event.involved_object.kind);
                continue;
            }
            let document = match std::panic::catch_unwind(AssertUnwindSafe(|| encode_event(event, None))) {
                Ok(document) => document,
                Err(_) => {
                    error!("panic while encoding event {:?}, dropping", event_uid(event));
                    continue;
                },
            };
            started
                .tx
                .send(QueueUnit { operation: Operation::List, document })
                .await
                .map_err(|_| anyhow::anyhow!("document-store queue closed"))?;
        }
        Ok(())
    }
}

async fn create_collections_map_indexes(collection: &Collection<Document>) -> EmptyResult {
    let models = vec![
        IndexModel::builder()
            .keys(doc! { KUBERNETES_HOST_FIELD: 1 })
            .options(IndexOptions::builder().unique(true).name("query_host".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { COLLECTION_NAME_FIELD: 1 })
            .options(IndexOptions::builder().unique(true).name("query_collection".to_string()).build())
            .build(),
    ];
    collection.create_indexes(models).await?;
    Ok(())
}

async fn create_event_collection_indexes(collection: &Collection<Document>) -> EmptyResult {
    let models = vec![
        IndexModel::builder()
            .keys(doc! { METADATA_UID_FIELD: 1 })
            .options(IndexOptions::builder().unique(true).name("query_id".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! {
                INVOLVED_OBJECT_KIND_FIELD: 1,
                INVOLVED_OBJECT_NAME_FIELD: 1,
                INVOLVED_OBJECT_NAMESPACE_FIELD: 1,
            })
            .options(IndexOptions::builder().unique(false).sparse(true).name("query_info".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { CREATION_TIMESTAMP_FIELD: -1 })
            .options(IndexOptions::builder().unique(false).sparse(true).name("query_time".to_string()).build())
            .build(),
    ];
    collection.create_indexes(models).await?;
    Ok(())
}

/// Find-or-insert with retry on duplicate key (spec §5, §9 Open Question
/// resolution): the `kubernetes_host` unique index guarantees at most one
/// inserted winner when two supervisors race on the same identity (spec
/// scenario S7); the loser reads the winner's value back.
async fn resolve_collection_name(collections_map: &Collection<Document>, kubernetes_host: &str) -> anyhow::Result<String> {
    if let Some(existing) = collections_map.find_one(doc! { KUBERNETES_HOST_FIELD: kubernetes_host }).await? {
        return Ok(existing.get_str(COLLECTION_NAME_FIELD)?.to_string());
    }

    let collection_name = collection_name_for_identity(kubernetes_host);
    let insert = collections_map
        .insert_one(doc! { KUBERNETES_HOST_FIELD: kubernetes_host, COLLECTION_NAME_FIELD: &collection_name })
        .await;

    match insert {
        Ok(_) => Ok(collection_name),
        Err(e) if is_duplicate_key_error(&e) => collections_map
            .find_one(doc! { KUBERNETES_HOST_FIELD: kubernetes_host })
            .await?
            .ok_or_else(|| anyhow::anyhow!("collections_map race: winning document vanished"))?
            .get_str(COLLECTION_NAME_FIELD)
            .map(str::to_string)
            .map_err(Into::into),
        Err(e) => Err(e.into()),
    }
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    err.code() == Some(11000)
}

async fn worker_loop(mut rx: mpsc::Receiver<QueueUnit>, mut stop_rx: oneshot::Receiver<oneshot::Sender<()>>, collection: Collection<Document>) {
    loop {
        tokio::select! {
            maybe_unit = rx.recv() => {
                match maybe_unit {
                    Some(unit) => dealing_event(&collection, unit).await,
                    None => return,
                }
            },
            done = &mut stop_rx => {
                if let Ok(done_tx) = done {
                    rx.close();
                    while let Some(unit) = rx.recv().await {
                        dealing_event(&collection, unit).await;
                    }
                    let _ = done_tx.send(());
                }
                return;
            },
        }
    }
}

/// One queued unit, isolated so a corrupt document or transient driver panic
/// cannot take down the worker task (spec §4.5 "panics ... recovered per
/// unit").
async fn dealing_event(collection: &Collection<Document>, unit: QueueUnit) {
    let uid = match extract_uid(&unit.document) {
        Some(uid) => uid.to_string(),
        None => {
            error!("queued document missing metadata.uid, dropping");
            return;
        },
    };

    let result = match unit.operation {
        Operation::Add => insert_event(collection, &unit.document).await,
        Operation::List => upsert_if_changed(collection, &uid, &unit.document).await,
        Operation::Update => update_with_deadline(collection, &uid, &unit.document).await,
    };

    match result {
        Ok(()) => debug!("success dealing event: {uid}"),
        Err(e) => error!("failed to deal event {uid}: {e}"),
    }
}

fn extract_uid(document: &Document) -> Option<&str> {
    document.get_document("metadata").ok()?.get_str("uid").ok()
}

async fn insert_event(collection: &Collection<Document>, document: &Document) -> EmptyResult {
    // Duplicate-key failures are expected under races with the OnList path
    // and are allowed to fail silently (spec §4.5 "OnAdd": "on duplicate key
    // the operation is allowed to fail").
    match collection.insert_one(document).await {
        Ok(_) => Ok(()),
        Err(e) if is_duplicate_key_error(&e) => {
            warn!("duplicate key on insert, dropping: {e}");
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}

async fn upsert_if_changed(collection: &Collection<Document>, uid: &str, document: &Document) -> EmptyResult {
    let filter = doc! { METADATA_UID_FIELD: uid };
    let projection = doc! { "_id": 0, ATTACH_JSON_FIELD: 0, ATTACH_DOC_FIELD: 0 };
    let options = mongodb::options::FindOneOptions::builder().projection(projection).build();

    match collection.find_one(filter.clone()).with_options(options).await? {
        None => {
            collection.insert_one(document).await?;
        },
        Some(existing) => {
            let existing = strip_incomparable_fields(existing);
            let new = strip_incomparable_fields(document.clone());
            if existing != new {
                collection.update_one(filter, doc! { "$set": document.clone() }).await?;
            }
        },
    }
    Ok(())
}

async fn update_with_deadline(collection: &Collection<Document>, uid: &str, document: &Document) -> EmptyResult {
    let filter = doc! { METADATA_UID_FIELD: uid };
    let options = FindOneAndUpdateOptions::builder().max_time(Duration::from_secs(UPSERT_OPERATION_TIMEOUT_SECS)).build();

    tokio::time::timeout(
        Duration::from_secs(UPSERT_OPERATION_TIMEOUT_SECS),
        collection.find_one_and_update(filter, doc! { "$set": document.clone() }).with_options(options),
    )
    .await
    .map_err(|_| anyhow::anyhow!("update timed out after {UPSERT_OPERATION_TIMEOUT_SECS}s"))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use event_exporter_testutils::events::fake_event;

    use super::*;

    #[test]
    fn extract_uid_reads_nested_metadata_document() {
        let doc = doc! { "metadata": { "uid": "u1" } };
        assert_eq!(extract_uid(&doc), Some("u1"));
        assert_eq!(extract_uid(&doc! {}), None);
    }

    #[test]
    fn on_add_filters_non_pod_node_kinds_before_enrichment() {
        let event = fake_event("u1", "ConfigMap", "ns", "cm");
        assert_eq!(InvolvedKind::of(&event), InvolvedKind::Other);
    }
}
