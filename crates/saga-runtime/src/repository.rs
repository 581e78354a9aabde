//! Locking saga repository.
//!
//! The repository is the single authority for two questions: which saga
//! identifiers exist, and which are currently being processed. The
//! second is answered by the hold map: one async mutex per identifier,
//! acquired before any mutation and released when the claim guard
//! drops, so every exit path (success, handler failure, serialization
//! failure) releases the hold.

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex as StdMutex};

use common::{AssociationValue, SagaId};
use saga_store::{SagaRecord, SagaStore};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::behavior::SagaBehavior;
use crate::error::{Result, SagaError};
use crate::index::AssociationIndex;
use crate::instance::SagaInstance;
use crate::serializer::{JsonSerializer, StateSerializer};

/// An exclusively held saga instance.
///
/// The hold on the saga's identifier lives exactly as long as this
/// value: committing consumes it, and dropping it (on any error path)
/// releases the hold with the uncommitted mutation discarded.
pub struct ClaimedSaga<T> {
    instance: SagaInstance<T>,
    hold: OwnedMutexGuard<()>,
}

impl<T> Deref for ClaimedSaga<T> {
    type Target = SagaInstance<T>;

    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl<T> DerefMut for ClaimedSaga<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.instance
    }
}

/// Repository enforcing one live representation per saga identifier.
///
/// All load, create, commit and delete traffic for a saga type flows
/// through here. Persistence goes to the configured [`SagaStore`]
/// (wrap it in a `CachingSagaStore` to amortize reads); the in-memory
/// [`AssociationIndex`] is maintained as a derived view on every
/// commit and seeded from the store on lookup misses.
pub struct SagaRepository<B: SagaBehavior, S> {
    store: Arc<S>,
    serializer: Arc<dyn StateSerializer<B::State>>,
    index: AssociationIndex,
    // Hold map entries are kept for the process lifetime: pruning on
    // release would allow two fresh mutexes to coexist for one id.
    holds: StdMutex<HashMap<SagaId, Arc<Mutex<()>>>>,
}

impl<B, S> SagaRepository<B, S>
where
    B: SagaBehavior,
    S: SagaStore,
{
    /// Creates a repository with the default JSON state serializer.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_serializer(store, Arc::new(JsonSerializer))
    }

    /// Creates a repository with a caller-provided state serializer.
    pub fn with_serializer(store: Arc<S>, serializer: Arc<dyn StateSerializer<B::State>>) -> Self {
        Self {
            store,
            serializer,
            index: AssociationIndex::new(),
            holds: StdMutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn hold_handle(&self, saga_id: SagaId) -> Arc<Mutex<()>> {
        let mut holds = self.holds.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(holds.entry(saga_id).or_default())
    }

    /// Acquires the exclusive hold for an identifier, waiting for the
    /// current holder to commit or release. No busy-waiting: waiters
    /// queue on the identifier's mutex.
    async fn acquire(&self, saga_id: SagaId) -> OwnedMutexGuard<()> {
        self.hold_handle(saga_id).lock_owned().await
    }

    /// Allocates a fresh identifier and returns an empty instance,
    /// already exclusively held. Nothing is persisted until commit.
    pub async fn create_instance(&self) -> ClaimedSaga<B::State> {
        let saga_id = SagaId::new();
        let hold = self.acquire(saga_id).await;
        tracing::debug!(%saga_id, saga_type = B::saga_type(), "saga instance created");
        ClaimedSaga {
            instance: SagaInstance::fresh(saga_id, B::State::default()),
            hold,
        }
    }

    /// Loads a saga under an exclusive hold, waiting if it is currently
    /// held elsewhere.
    ///
    /// Fails with `NotFound` (hold released) if the identifier has no
    /// record.
    pub async fn load(&self, saga_id: SagaId) -> Result<ClaimedSaga<B::State>> {
        let hold = self.acquire(saga_id).await;
        self.rehydrate(saga_id, hold).await
    }

    /// Like [`load`](Self::load), but fails with `AlreadyClaimed`
    /// instead of waiting when the saga is held elsewhere.
    pub async fn try_load(&self, saga_id: SagaId) -> Result<ClaimedSaga<B::State>> {
        let hold = self
            .hold_handle(saga_id)
            .try_lock_owned()
            .map_err(|_| SagaError::AlreadyClaimed(saga_id))?;
        self.rehydrate(saga_id, hold).await
    }

    async fn rehydrate(
        &self,
        saga_id: SagaId,
        hold: OwnedMutexGuard<()>,
    ) -> Result<ClaimedSaga<B::State>> {
        let record = self
            .store
            .load(saga_id)
            .await?
            .ok_or(SagaError::NotFound(saga_id))?;
        let state = self.serializer.deserialize(&record.payload)?;
        Ok(ClaimedSaga {
            instance: SagaInstance::rehydrated(saga_id, state, record.associations),
            hold,
        })
    }

    /// Persists a claimed saga and releases its hold.
    ///
    /// An `Active` instance is inserted (first commit) or updated, and
    /// the association index is reconciled against the previous commit.
    /// A `Completed` instance is deleted together with all of its
    /// association entries, after which the identifier no longer
    /// resolves. The hold is released on every path, including errors.
    #[tracing::instrument(skip_all, fields(saga_id = %claimed.id(), saga_type = B::saga_type()))]
    pub async fn commit(&self, claimed: ClaimedSaga<B::State>) -> Result<()> {
        // The guard stays alive until this frame unwinds, so `?` below
        // still ends with the hold released.
        let ClaimedSaga {
            instance,
            hold: _hold,
        } = claimed;
        let saga_id = instance.id();

        if instance.is_completed() {
            self.remove(&instance).await?;
            metrics::counter!("sagas_completed_total").increment(1);
            tracing::info!("saga completed and removed");
            return Ok(());
        }

        let payload = self.serializer.serialize(instance.state())?;
        let record = SagaRecord::new(
            saga_id,
            B::saga_type(),
            payload,
            instance.associations().clone(),
        );
        if instance.persisted {
            self.store.update(record).await?;
        } else {
            self.store.insert(record).await?;
        }

        let removed = instance
            .committed_associations
            .difference(instance.associations());
        self.index.remove_all(saga_id, removed).await;
        for value in instance.associations() {
            self.index.add(value.clone(), saga_id).await;
        }

        metrics::counter!("saga_commits_total").increment(1);
        Ok(())
    }

    /// Deletes a claimed saga regardless of its status, removing its
    /// record and every association index entry, and releases the
    /// hold. The identifier no longer resolves afterwards.
    pub async fn delete(&self, claimed: ClaimedSaga<B::State>) -> Result<()> {
        let ClaimedSaga {
            instance,
            hold: _hold,
        } = claimed;
        self.remove(&instance).await
    }

    async fn remove(&self, instance: &SagaInstance<B::State>) -> Result<()> {
        let saga_id = instance.id();
        if instance.persisted {
            self.store.delete(saga_id).await?;
        }
        let all: HashSet<_> = instance
            .associations()
            .union(&instance.committed_associations)
            .collect();
        self.index.remove_all(saga_id, all).await;
        Ok(())
    }

    /// Drops an index entry for an identifier whose record turned out
    /// to no longer exist (e.g. deleted out-of-band by another process
    /// sharing the store). Without this, a stale entry would keep the
    /// value resolving to the vanished saga on every lookup.
    pub async fn forget_association(&self, value: &AssociationValue, saga_id: SagaId) {
        tracing::debug!(%saga_id, %value, "dropping stale association index entry");
        self.index.remove(value, saga_id).await;
    }

    /// Returns the identifiers of sagas associated with a value.
    ///
    /// Consults the index first and falls back to the store on a miss,
    /// seeding the index with the result. Never blocks on any
    /// identifier's exclusivity: callers must still go through
    /// [`load`](Self::load) before mutating, and must tolerate
    /// `NotFound` for identifiers deleted in the meantime.
    pub async fn find_associated(&self, value: &AssociationValue) -> Result<HashSet<SagaId>> {
        let indexed = self.index.find(value).await;
        if !indexed.is_empty() {
            return Ok(indexed);
        }

        let stored = self
            .store
            .find_by_association(B::saga_type(), value)
            .await?;
        if !stored.is_empty() {
            self.index.seed(value.clone(), stored.clone()).await;
        }
        Ok(stored)
    }
}
