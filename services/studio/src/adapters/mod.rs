pub mod http_api;
pub mod kv_store;

pub use http_api::{HttpApiAdapter, HttpTimeouts};
pub use kv_store::{FileStore, MemoryStore};
