//! services/studio/src/lib.rs
//!
//! Client-side core of the content studio: session handling, the entity
//! cache, the API facade and the generation/style workflows.

pub mod adapters;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod workflow;

use std::sync::Arc;

use studio_core::ports::{KeyValueStore, StudioApi};

use crate::adapters::{FileStore, HttpApiAdapter, HttpTimeouts};
use crate::cache::EntityCache;
use crate::client::StudioClient;
use crate::config::Config;
use crate::error::{StudioError, StudioResult};
use crate::session::{SessionContext, SessionSettings};

/// The wired-up client: one session and the facade on top of it.
#[derive(Clone)]
pub struct Studio {
    pub session: Arc<SessionContext>,
    pub client: StudioClient,
}

impl Studio {
    /// Wires the studio from explicit adapters.
    pub fn new(
        api: Arc<dyn StudioApi>,
        store: Arc<dyn KeyValueStore>,
        cache: Arc<EntityCache>,
        settings: SessionSettings,
    ) -> Self {
        let session = SessionContext::new(Arc::clone(&api), store, cache, settings);
        let client = StudioClient::new(api, Arc::clone(&session));
        Self { session, client }
    }

    /// Wires the studio against the HTTP backend with a file-backed session.
    pub fn from_config(config: &Config) -> StudioResult<Self> {
        let timeouts = HttpTimeouts {
            request: config.request_timeout,
            generation: config.generation_timeout,
            upload: config.upload_timeout,
        };
        let api = HttpApiAdapter::new(&config.api_base_url, timeouts).map_err(StudioError::from)?;
        Ok(Self::new(
            Arc::new(api),
            Arc::new(FileStore::new(&config.session_path)),
            Arc::new(EntityCache::new(config.cache_stale_time)),
            SessionSettings::from(config),
        ))
    }
}
