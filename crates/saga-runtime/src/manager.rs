//! Saga manager: routes events to saga instances.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use common::{AssociationValue, SagaId};
use saga_store::SagaStore;
use tokio::sync::Mutex;

use crate::behavior::SagaBehavior;
use crate::error::{Result, SagaError};
use crate::repository::{ClaimedSaga, SagaRepository};

/// Rule deciding whether a new saga is created when an association
/// value matches no existing instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPolicy {
    /// Create exactly one new instance when no existing one matches;
    /// otherwise invoke the matches and create nothing.
    IfNoneFound,

    /// Never create; an unmatched event is a no-op for this saga type.
    None,
}

/// Summary of one `handle` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOutcome {
    /// Saga instances the event was applied to (created ones included).
    pub invoked: usize,
    /// Saga instances created for the event.
    pub created: usize,
}

type Extractor<E> = Box<dyn Fn(&E) -> Vec<AssociationValue> + Send + Sync>;

/// One registered (event → association values) extraction rule.
struct AssociationRoute<E> {
    policy: CreationPolicy,
    extract: Extractor<E>,
}

/// Builder assembling the manager's route table.
///
/// Routes are declared once at startup; there is no runtime discovery.
pub struct SagaManagerBuilder<B: SagaBehavior, S> {
    behavior: B,
    repository: Arc<SagaRepository<B, S>>,
    routes: Vec<AssociationRoute<B::Event>>,
}

impl<B, S> SagaManagerBuilder<B, S>
where
    B: SagaBehavior,
    S: SagaStore,
{
    /// Registers an extraction rule with its creation policy.
    ///
    /// The extractor derives zero or more association values from an
    /// event; returning none means the route does not apply to that
    /// event. When several routes derive the same value for one event,
    /// the earliest-registered route's policy applies to that value.
    pub fn route(
        mut self,
        policy: CreationPolicy,
        extract: impl Fn(&B::Event) -> Vec<AssociationValue> + Send + Sync + 'static,
    ) -> Self {
        self.routes.push(AssociationRoute {
            policy,
            extract: Box::new(extract),
        });
        self
    }

    /// Finalizes the manager.
    pub fn build(self) -> SagaManager<B, S> {
        SagaManager {
            behavior: self.behavior,
            repository: self.repository,
            routes: self.routes,
            creation_locks: StdMutex::new(HashMap::new()),
        }
    }
}

/// Routes events to the saga instances of one configured saga type.
///
/// For each event, the manager derives association values through the
/// registered routes, resolves candidate instances through the
/// repository, and invokes the behavior on each under an exclusive
/// hold, de-duplicated by identifier so an event matching one saga
/// through several values invokes it once.
pub struct SagaManager<B: SagaBehavior, S> {
    behavior: B,
    repository: Arc<SagaRepository<B, S>>,
    routes: Vec<AssociationRoute<B::Event>>,
    // Check-and-create must be atomic per association value, or N
    // concurrent identical events would create N sagas.
    creation_locks: StdMutex<HashMap<AssociationValue, Arc<Mutex<()>>>>,
}

impl<B, S> SagaManager<B, S>
where
    B: SagaBehavior,
    S: SagaStore,
{
    /// Starts building a manager for the given behavior and repository.
    pub fn builder(behavior: B, repository: Arc<SagaRepository<B, S>>) -> SagaManagerBuilder<B, S> {
        SagaManagerBuilder {
            behavior,
            repository,
            routes: Vec::new(),
        }
    }

    /// Returns the repository this manager routes through.
    pub fn repository(&self) -> &SagaRepository<B, S> {
        &self.repository
    }

    fn creation_lock(&self, value: &AssociationValue) -> Arc<Mutex<()>> {
        let mut locks = self
            .creation_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(value.clone()).or_default())
    }

    /// Routes one event.
    ///
    /// Existing matches are invoked first; then, for every derived
    /// value under `IfNoneFound` whose candidates all turned out to be
    /// gone, exactly one new instance is created inside the per-value
    /// critical section. Handler failures discard that instance's
    /// mutation and are reported after the remaining candidates have
    /// run; a candidate deleted between lookup and load is skipped and
    /// its stale index entry dropped, so the value is treated as
    /// unmatched rather than permanently shadowed by the dead id.
    #[tracing::instrument(skip_all, fields(saga_type = B::saga_type()))]
    pub async fn handle(&self, event: &B::Event) -> Result<HandleOutcome> {
        metrics::counter!("saga_events_handled_total").increment(1);
        let started = std::time::Instant::now();

        let mut values: Vec<(AssociationValue, CreationPolicy)> = Vec::new();
        let mut seen_values = HashSet::new();
        for route in &self.routes {
            for value in (route.extract)(event) {
                if seen_values.insert(value.clone()) {
                    values.push((value, route.policy));
                }
            }
        }

        let mut outcome = HandleOutcome::default();
        let mut first_error = None;
        let mut invoked_ids = HashSet::new();
        let mut creation_pending = Vec::new();

        for (value, policy) in values {
            let surviving = self
                .invoke_candidates(&value, event, &mut invoked_ids, &mut outcome, &mut first_error)
                .await?;
            if surviving == 0 && policy == CreationPolicy::IfNoneFound {
                creation_pending.push(value);
            }
        }

        for value in creation_pending {
            let lock = self.creation_lock(&value);
            let _creating = lock.lock().await;

            // Another event may have created the saga while this one
            // was waiting; re-check before creating.
            let surviving = self
                .invoke_candidates(&value, event, &mut invoked_ids, &mut outcome, &mut first_error)
                .await?;
            if surviving == 0 {
                self.create_and_invoke(value, event, &mut outcome, &mut first_error)
                    .await?;
            }
        }

        metrics::histogram!("saga_event_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match first_error {
            Some(error) => Err(error),
            None => Ok(outcome),
        }
    }

    /// Runs the event against every candidate a value resolves to,
    /// de-duplicated across values, and returns how many candidates
    /// still exist. Vanished candidates are purged from the index so
    /// the caller can treat a fully-dead value as unmatched.
    async fn invoke_candidates(
        &self,
        value: &AssociationValue,
        event: &B::Event,
        invoked_ids: &mut HashSet<SagaId>,
        outcome: &mut HandleOutcome,
        first_error: &mut Option<SagaError>,
    ) -> Result<usize> {
        let mut surviving = 0;
        for saga_id in self.repository.find_associated(value).await? {
            if invoked_ids.contains(&saga_id) {
                surviving += 1;
                continue;
            }
            if self.invoke(saga_id, event, outcome, first_error).await? {
                invoked_ids.insert(saga_id);
                surviving += 1;
            } else {
                self.repository.forget_association(value, saga_id).await;
            }
        }
        Ok(surviving)
    }

    /// Loads, invokes and commits one existing candidate, returning
    /// whether its record still existed. A handler error is recorded,
    /// not returned: store errors alone abort the sweep.
    async fn invoke(
        &self,
        saga_id: SagaId,
        event: &B::Event,
        outcome: &mut HandleOutcome,
        first_error: &mut Option<SagaError>,
    ) -> Result<bool> {
        let claimed = match self.repository.load(saga_id).await {
            Ok(claimed) => claimed,
            Err(SagaError::NotFound(_)) => {
                // Deleted between find_associated and load
                tracing::debug!(%saga_id, "candidate saga vanished, skipping");
                return Ok(false);
            }
            Err(error) => return Err(error),
        };
        self.apply(claimed, event, outcome, first_error).await?;
        Ok(true)
    }

    /// Creates a fresh instance for an unmatched association value and
    /// runs the event against it. Called with the value's creation
    /// lock held so the re-check stays valid through the commit.
    async fn create_and_invoke(
        &self,
        value: AssociationValue,
        event: &B::Event,
        outcome: &mut HandleOutcome,
        first_error: &mut Option<SagaError>,
    ) -> Result<()> {
        let mut claimed = self.repository.create_instance().await;
        claimed.associate(value);

        let invoked_before = outcome.invoked;
        self.apply(claimed, event, outcome, first_error).await?;
        if outcome.invoked > invoked_before {
            outcome.created += 1;
            metrics::counter!("sagas_created_total").increment(1);
        }
        Ok(())
    }

    async fn apply(
        &self,
        mut claimed: ClaimedSaga<B::State>,
        event: &B::Event,
        outcome: &mut HandleOutcome,
        first_error: &mut Option<SagaError>,
    ) -> Result<()> {
        let saga_id = claimed.id();
        match self.behavior.handle(&mut claimed, event).await {
            Ok(()) => {
                self.repository.commit(claimed).await?;
                outcome.invoked += 1;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%saga_id, %error, "saga handler failed, discarding instance");
                // Dropping the claim releases the hold; the uncommitted
                // mutation goes with it.
                drop(claimed);
                first_error.get_or_insert(SagaError::Handler {
                    saga_id,
                    reason: error.to_string(),
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use saga_store::InMemorySagaStore;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use super::*;
    use crate::instance::SagaInstance;

    #[derive(Debug, Clone)]
    enum OrderEvent {
        Started { order_id: String },
        Shipped { order_id: String },
    }

    impl OrderEvent {
        fn order_id(&self) -> &str {
            match self {
                OrderEvent::Started { order_id } | OrderEvent::Shipped { order_id } => order_id,
            }
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct OrderState {
        events_seen: Vec<String>,
    }

    #[derive(Debug, Error)]
    #[error("handler rejected event")]
    struct Rejected;

    #[derive(Default)]
    struct OrderSaga {
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl SagaBehavior for OrderSaga {
        type Event = OrderEvent;
        type State = OrderState;
        type Error = Rejected;

        fn saga_type() -> &'static str {
            "OrderSaga"
        }

        async fn handle(
            &self,
            saga: &mut SagaInstance<Self::State>,
            event: &Self::Event,
        ) -> std::result::Result<(), Self::Error> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Rejected);
            }
            match event {
                OrderEvent::Started { .. } => {
                    saga.state_mut().events_seen.push("started".into());
                }
                OrderEvent::Shipped { .. } => {
                    saga.state_mut().events_seen.push("shipped".into());
                    saga.complete();
                }
            }
            Ok(())
        }
    }

    fn manager() -> SagaManager<OrderSaga, InMemorySagaStore> {
        let repository = Arc::new(SagaRepository::new(Arc::new(InMemorySagaStore::new())));
        SagaManager::builder(OrderSaga::default(), repository)
            .route(CreationPolicy::IfNoneFound, |event: &OrderEvent| {
                vec![AssociationValue::new("order_id", event.order_id())]
            })
            .build()
    }

    #[tokio::test]
    async fn creates_saga_when_none_matches() {
        let manager = manager();

        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome { invoked: 1, created: 1 });
        assert_eq!(manager.repository().store().record_count().await, 1);
    }

    #[tokio::test]
    async fn routes_to_existing_saga_without_creating() {
        let manager = manager();
        let value = AssociationValue::new("order_id", "42");

        manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        let ids = manager.repository().find_associated(&value).await.unwrap();
        assert_eq!(ids.len(), 1);

        // A second matching event must not create another instance
        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome { invoked: 1, created: 0 });
        assert_eq!(manager.repository().store().record_count().await, 1);
    }

    #[tokio::test]
    async fn none_policy_never_creates() {
        let repository = Arc::new(SagaRepository::new(Arc::new(InMemorySagaStore::new())));
        let manager = SagaManager::builder(OrderSaga::default(), repository)
            .route(CreationPolicy::None, |event: &OrderEvent| {
                vec![AssociationValue::new("order_id", event.order_id())]
            })
            .build();

        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome::default());
        assert_eq!(manager.repository().store().record_count().await, 0);
    }

    #[tokio::test]
    async fn completion_deletes_the_saga() {
        let manager = manager();
        let value = AssociationValue::new("order_id", "42");

        manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        manager
            .handle(&OrderEvent::Shipped {
                order_id: "42".into(),
            })
            .await
            .unwrap();

        assert!(
            manager
                .repository()
                .find_associated(&value)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(manager.repository().store().record_count().await, 0);
    }

    #[tokio::test]
    async fn handler_failure_discards_instance_and_surfaces_error() {
        let manager = manager();

        manager.behavior.fail_next.store(true, Ordering::SeqCst);
        let result = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await;

        assert!(matches!(result, Err(SagaError::Handler { .. })));
        // Nothing persisted and nothing stuck: the next event succeeds
        assert_eq!(manager.repository().store().record_count().await, 0);

        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome { invoked: 1, created: 1 });
    }

    #[tokio::test]
    async fn stale_index_entry_is_purged_and_creation_recovers() {
        let manager = manager();
        let value = AssociationValue::new("order_id", "42");

        manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        let ids = manager.repository().find_associated(&value).await.unwrap();
        let dead_id = *ids.iter().next().unwrap();

        // Record removed behind the repository's back; the index still
        // resolves the value to the dead identifier
        manager.repository().store().delete(dead_id).await.unwrap();

        // The dead candidate is dropped and the value treated as
        // unmatched, so a fresh saga is created for it
        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome { invoked: 1, created: 1 });

        let ids = manager.repository().find_associated(&value).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(!ids.contains(&dead_id));
    }

    #[tokio::test]
    async fn earliest_route_policy_wins_for_a_duplicate_value() {
        let repository = Arc::new(SagaRepository::new(Arc::new(InMemorySagaStore::new())));
        let manager = SagaManager::builder(OrderSaga::default(), repository)
            .route(CreationPolicy::None, |event: &OrderEvent| {
                vec![AssociationValue::new("order_id", event.order_id())]
            })
            .route(CreationPolicy::IfNoneFound, |event: &OrderEvent| {
                vec![AssociationValue::new("order_id", event.order_id())]
            })
            .build();

        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome::default());
        assert_eq!(manager.repository().store().record_count().await, 0);
    }

    #[tokio::test]
    async fn event_matching_one_saga_through_two_values_invokes_once() {
        let repository = Arc::new(SagaRepository::new(Arc::new(InMemorySagaStore::new())));
        let manager = SagaManager::builder(OrderSaga::default(), Arc::clone(&repository))
            .route(CreationPolicy::IfNoneFound, |event: &OrderEvent| {
                vec![AssociationValue::new("order_id", event.order_id())]
            })
            .route(CreationPolicy::None, |event: &OrderEvent| {
                vec![AssociationValue::new("shipment", event.order_id())]
            })
            .build();

        // Create the saga and give it both association values
        manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        let ids = repository
            .find_associated(&AssociationValue::new("order_id", "42"))
            .await
            .unwrap();
        let saga_id = *ids.iter().next().unwrap();
        let mut claimed = repository.load(saga_id).await.unwrap();
        claimed.associate(AssociationValue::new("shipment", "42"));
        repository.commit(claimed).await.unwrap();

        // Both routes now resolve to the same saga; it runs once
        let outcome = manager
            .handle(&OrderEvent::Started {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome { invoked: 1, created: 0 });

        let claimed = repository.load(saga_id).await.unwrap();
        assert_eq!(claimed.state().events_seen, vec!["started", "started"]);
    }

    #[tokio::test]
    async fn extractor_returning_nothing_is_a_noop() {
        let repository = Arc::new(SagaRepository::new(Arc::new(InMemorySagaStore::new())));
        let manager = SagaManager::builder(OrderSaga::default(), repository)
            .route(CreationPolicy::IfNoneFound, |event: &OrderEvent| {
                match event {
                    OrderEvent::Started { order_id } => {
                        vec![AssociationValue::new("order_id", order_id)]
                    }
                    OrderEvent::Shipped { .. } => Vec::new(),
                }
            })
            .build();

        let outcome = manager
            .handle(&OrderEvent::Shipped {
                order_id: "42".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::default());
    }
}
