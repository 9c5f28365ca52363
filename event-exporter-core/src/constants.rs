// Document-store pipe environment variables (spec §6)
pub const PIPE_MONGODB_CONNECT_URI_ENV_VAR: &str = "PIPE_MONGODB_CONNECT_URI";
pub const PIPE_MONGODB_DATABASE_NAME_ENV_VAR: &str = "PIPE_MONGODB_DATABASE_NAME";
pub const PIPE_MONGODB_ENABLE_JSON_ATTACH_ENV_VAR: &str = "PIPE_MONGODB_ENABLE_JSON_ATTACH";

// Defaults
pub const DEFAULT_DATABASE_NAME: &str = "kubernetes_events";
pub const DEFAULT_RESYNC_PERIOD: &str = "1m";
pub const DEFAULT_STORAGE_TTL: &str = "2h";
pub const DEFAULT_TERMINATION_GRACE_PERIOD: &str = "1m";

// Collection / field names
pub const COLLECTIONS_MAP_COLLECTION: &str = "collections_map";
pub const KUBERNETES_HOST_FIELD: &str = "kubernetes_host";
pub const COLLECTION_NAME_FIELD: &str = "collection_name";
pub const METADATA_UID_FIELD: &str = "metadata.uid";
pub const INVOLVED_OBJECT_KIND_FIELD: &str = "involvedObject.kind";
pub const INVOLVED_OBJECT_NAME_FIELD: &str = "involvedObject.name";
pub const INVOLVED_OBJECT_NAMESPACE_FIELD: &str = "involvedObject.namespace";
pub const CREATION_TIMESTAMP_FIELD: &str = "metadata.creationTimestamp";

// Attachment fields (spec §4.1, §6) — exactly one is present per document
pub const ATTACH_JSON_FIELD: &str = "_attachJson";
pub const ATTACH_DOC_FIELD: &str = "_attachDoc";

// Timing
pub const DOCUMENT_STORE_QUEUE_CAPACITY: usize = 1 << 20;
pub const UPSERT_OPERATION_TIMEOUT_SECS: u64 = 10;
pub const SINK_START_TIMEOUT_SECS: u64 = 30;

// Default pagination (spec §4.9 / §6 query adapter contract)
pub const DEFAULT_QUERY_LIMIT: i64 = 1000;
