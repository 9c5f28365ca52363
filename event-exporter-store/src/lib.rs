#![cfg_attr(coverage, feature(coverage_attribute))]
pub mod encode;
pub mod errors;
pub mod event;
pub mod pipe;
pub mod pipes;
pub mod query;
pub mod sink;
pub mod supervisor;
pub mod ttl_store;
pub mod watcher;

pub use crate::event::{
    event_uid,
    EventRecord,
    InvolvedKind,
};
pub use crate::pipe::{
    Pipe,
    PipeKind,
};
pub use crate::pipes::{
    DocumentStoreConfig,
    DocumentStorePipe,
    LoggerPipe,
};
pub use crate::sink::Sink;
pub use crate::supervisor::{
    Supervisor,
    SupervisorConfig,
};
pub use crate::ttl_store::{
    StoreHandler,
    TtlStore,
};
pub use crate::watcher::{
    EventHandler,
    EventWatcher,
    EventWatcherConfig,
};
