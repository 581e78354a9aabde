//! Storage contract and caching layer for the saga routing core.
//!
//! This crate defines the [`SagaStore`] trait every persistence backend
//! implements, the durable [`SagaRecord`] representation, an in-memory
//! reference backend, and a write-through [`CachingSagaStore`] decorator
//! that can wrap any backend without weakening its durability guarantees.

pub mod cache;
pub mod caching;
pub mod error;
pub mod memory;
pub mod record;
pub mod store;

pub use cache::{Cache, CacheConfig, LruSagaCache};
pub use caching::CachingSagaStore;
pub use common::{AssociationValue, SagaId};
pub use error::{Result, SagaStoreError};
pub use memory::InMemorySagaStore;
pub use record::SagaRecord;
pub use store::SagaStore;
