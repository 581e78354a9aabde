//! In-memory saga instance.

use std::collections::HashSet;

use common::{AssociationValue, SagaId};

use crate::status::SagaStatus;

/// A live saga instance.
///
/// Holds the saga's opaque domain state together with its identity,
/// status and current association values. Handlers mutate the instance
/// through this API while it is exclusively held; the repository
/// persists (or deletes) it on commit.
#[derive(Debug)]
pub struct SagaInstance<T> {
    id: SagaId,
    status: SagaStatus,
    state: T,
    associations: HashSet<AssociationValue>,
    /// Association set as of the last commit, used to compute which
    /// index entries a commit adds and removes.
    pub(crate) committed_associations: HashSet<AssociationValue>,
    /// False until the first commit reaches the store (insert vs update).
    pub(crate) persisted: bool,
}

impl<T> SagaInstance<T> {
    /// Creates a fresh, never-persisted instance.
    pub(crate) fn fresh(id: SagaId, state: T) -> Self {
        Self {
            id,
            status: SagaStatus::Active,
            state,
            associations: HashSet::new(),
            committed_associations: HashSet::new(),
            persisted: false,
        }
    }

    /// Rebuilds an instance from its stored representation.
    pub(crate) fn rehydrated(id: SagaId, state: T, associations: HashSet<AssociationValue>) -> Self {
        Self {
            id,
            status: SagaStatus::Active,
            state,
            committed_associations: associations.clone(),
            associations,
            persisted: true,
        }
    }

    /// Returns the saga's identifier.
    pub fn id(&self) -> SagaId {
        self.id
    }

    /// Returns the saga's lifecycle status.
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns a reference to the domain state.
    pub fn state(&self) -> &T {
        &self.state
    }

    /// Returns a mutable reference to the domain state.
    pub fn state_mut(&mut self) -> &mut T {
        &mut self.state
    }

    /// Returns the current association values.
    pub fn associations(&self) -> &HashSet<AssociationValue> {
        &self.associations
    }

    /// Adds an association value; future events carrying it will route
    /// to this saga once committed.
    pub fn associate(&mut self, value: AssociationValue) {
        self.associations.insert(value);
    }

    /// Removes an association value.
    pub fn dissociate(&mut self, value: &AssociationValue) {
        self.associations.remove(value);
    }

    /// Marks the saga complete. The next commit deletes its record and
    /// all of its association entries.
    pub fn complete(&mut self) {
        self.status = SagaStatus::Completed;
    }

    /// Returns true if the saga has been marked complete.
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }
}
