pub mod document_store;
pub mod logger;

pub use document_store::{
    DocumentStoreConfig,
    DocumentStorePipe,
};
pub use logger::LoggerPipe;
