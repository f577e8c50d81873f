//! services/studio/src/cache/mod.rs
//!
//! Client-side entity cache: typed keys, staleness, mutation-driven
//! invalidation and the retry policy used when refetching.

pub mod invalidation;
pub mod key;
pub mod retry;
pub mod store;

pub use invalidation::{InvalidationTarget, Mutation};
pub use key::{CacheKey, EntityKind, ListFilter};
pub use retry::RetryPolicy;
pub use store::EntityCache;
