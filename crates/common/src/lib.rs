//! Shared types for the saga routing core.

pub mod types;

pub use types::{AssociationValue, SagaId};
