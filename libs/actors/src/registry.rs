//! Actor Registry
//!
//! Id-addressed cache of resident actors for one entity kind. Actors are
//! activated lazily on first delivery, persisted on a cadence while dirty,
//! and deactivated when idle, under capacity pressure, on a Stop directive,
//! or at shutdown.
//!
//! Concurrent misses for the same id race on a single `DashMap` entry; the
//! first insert wins and every other caller waits for that instance to
//! settle. An instance that is still stopping is never replaced until its
//! final save has finished.

use crate::actor::{EntityActor, LifecycleState};
use crate::config::RegistryConfig;
use crate::dispatch::HandlerTable;
use crate::error::{ActivationError, AskError, ConfigError, DeliveryError, HandlerError, SendError};
use crate::executor::{Executor, TokioExecutor};
use crate::identity::ActorIdentity;
use crate::mailbox::Rejected;
use crate::message::{Message, ReplySink};
use crate::metrics::{RuntimeMetrics, RuntimeStats};
use crate::persistence::StateStore;
use crate::supervisor::{EscalationHandler, SharedPolicy, SupervisorPolicy};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use runtime_config::RegistrySettings;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Called with the final state of every deactivated actor
pub type CleanupHook<S> = Arc<dyn Fn(&ActorIdentity, &S) + Send + Sync>;

/// Shared registry internals; actors hold a weak reference back to it
pub(crate) struct RegistryInner<S> {
    pub(crate) kind: Arc<str>,
    pub(crate) actors: DashMap<i64, Arc<EntityActor<S>>>,
    pub(crate) handlers: HandlerTable<S>,
    pub(crate) store: Arc<dyn StateStore<S>>,
    /// Initial per-instance override for every actor of this kind
    pub(crate) actor_supervisor: Option<SharedPolicy>,
    pub(crate) default_supervisor: Option<SharedPolicy>,
    pub(crate) escalation: Option<Arc<dyn EscalationHandler>>,
    pub(crate) cleanup: Option<CleanupHook<S>>,
    pub(crate) config: RegistryConfig,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) metrics: Arc<RuntimeMetrics>,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Send + Sync + 'static> RegistryInner<S> {
    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Hand one drain turn to the executor
    pub(crate) fn submit(self: &Arc<Self>, actor: Arc<EntityActor<S>>) -> bool {
        if !self.is_accepting() {
            return false;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = TurnGuard {
            host: Arc::clone(self),
        };
        self.executor.execute(Box::pin(async move {
            let host = Arc::clone(&guard.host);
            actor.run_turn(host).await;
            drop(guard);
        }));
        true
    }

    /// Remove `actor` only if it is still the resident instance for its id
    pub(crate) fn remove_if_same(&self, actor: &Arc<EntityActor<S>>) -> bool {
        self.actors
            .remove_if(&actor.identity().id(), |_, resident| Arc::ptr_eq(resident, actor))
            .is_some()
    }

    pub(crate) fn escalate(&self, identity: &ActorIdentity, message_kind: &str, error: &HandlerError) {
        match &self.escalation {
            Some(handler) => handler.escalate(identity, message_kind, error),
            None => error!(
                actor_id = %identity,
                message_kind,
                error = %error,
                "Escalated actor failure with no escalation handler installed"
            ),
        }
    }
}

/// Decrements the in-flight count when a turn ends or is aborted
struct TurnGuard<S> {
    host: Arc<RegistryInner<S>>,
}

impl<S> Drop for TurnGuard<S> {
    fn drop(&mut self) {
        if self.host.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.host.drained.notify_waiters();
        }
    }
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub persisted: usize,
    pub evicted: usize,
}

/// Outcome of a registry shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub persisted: usize,
    pub deactivated: usize,
    /// Actors dropped at the deadline without their final save
    pub unpersisted: usize,
    /// Drain turns force-terminated after the grace period
    pub aborted: usize,
    pub timed_out: bool,
}

/// Registry of resident actors for one entity kind
pub struct ActorRegistry<S> {
    inner: Arc<RegistryInner<S>>,
}

impl<S> Clone for ActorRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> ActorRegistry<S> {
    pub fn builder(kind: impl Into<String>) -> RegistryBuilder<S> {
        RegistryBuilder::new(kind)
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Number of resident instances
    pub fn len(&self) -> usize {
        self.inner.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.actors.is_empty()
    }

    pub fn resident_ids(&self) -> Vec<i64> {
        self.inner.actors.iter().map(|e| *e.key()).collect()
    }

    pub fn metrics(&self) -> &Arc<RuntimeMetrics> {
        &self.inner.metrics
    }

    pub fn stats(&self) -> RuntimeStats {
        self.inner.metrics.snapshot()
    }

    /// False once shutdown has begun
    pub fn is_accepting(&self) -> bool {
        self.inner.is_accepting()
    }

    /// Resident instance for `id`; never activates
    pub fn get_if_present(&self, id: i64) -> Option<Arc<EntityActor<S>>> {
        self.inner.actors.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Resident instance for `id`, activating one if needed
    pub async fn get_or_create(&self, id: i64) -> Result<Arc<EntityActor<S>>, ActivationError> {
        loop {
            if !self.inner.is_accepting() {
                return Err(ActivationError::ShuttingDown {
                    identity: ActorIdentity::new(id, Arc::clone(&self.inner.kind)),
                });
            }

            let (actor, created) = match self.inner.actors.entry(id) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    let identity = ActorIdentity::new(id, Arc::clone(&self.inner.kind));
                    let actor = EntityActor::new(identity, &self.inner);
                    entry.insert(Arc::clone(&actor));
                    (actor, true)
                }
            };

            if created {
                return match actor.activate(&self.inner).await {
                    Ok(()) => {
                        self.inner.metrics.activations.fetch_add(1, Ordering::Relaxed);
                        self.enforce_capacity(&actor);
                        Ok(actor)
                    }
                    Err(err) => {
                        self.inner
                            .metrics
                            .activation_failures
                            .fetch_add(1, Ordering::Relaxed);
                        self.inner.remove_if_same(&actor);
                        Err(err)
                    }
                };
            }

            match actor.settled().await {
                LifecycleState::Running => return Ok(actor),
                _ => {
                    self.inner.remove_if_same(&actor);
                    if let Some(reason) = actor.activation_error() {
                        return Err(ActivationError::Abandoned {
                            identity: actor.identity().clone(),
                            reason,
                        });
                    }
                    // Stopped after running; replace it with a fresh instance.
                }
            }
        }
    }

    /// Deliver a message, activating the target if needed
    ///
    /// A resident instance found stopping is replaced once and the delivery
    /// retried against the fresh instance.
    pub async fn send(&self, id: i64, message: Message) -> Result<(), SendError> {
        let (actor, message) = self.resolve(id, message).await?;
        let message = match actor.offer(message).await {
            Ok(()) => return Ok(()),
            Err(Rejected {
                message,
                reason: DeliveryError::NotRunning | DeliveryError::Closed,
            }) => message,
            Err(rejected) => return Err(self.refuse(rejected)),
        };

        debug!(
            actor_id = %actor.identity(),
            "Resident actor stopping, retrying delivery on a fresh instance"
        );
        let (actor, message) = self.resolve(id, message).await?;
        actor.offer(message).await.map_err(|rejected| self.refuse(rejected))
    }

    async fn resolve(&self, id: i64, message: Message) -> Result<(Arc<EntityActor<S>>, Message), SendError> {
        match self.get_or_create(id).await {
            Ok(actor) => Ok((actor, message)),
            Err(err) => {
                self.inner
                    .metrics
                    .deliveries_rejected
                    .fetch_add(1, Ordering::Relaxed);
                message.reject(HandlerError::Rejected {
                    reason: DeliveryError::NotRunning,
                });
                Err(err.into())
            }
        }
    }

    fn refuse(&self, rejected: Rejected<Message>) -> SendError {
        self.inner
            .metrics
            .deliveries_rejected
            .fetch_add(1, Ordering::Relaxed);
        let reason = rejected.reason;
        rejected.message.reject(HandlerError::Rejected { reason });
        SendError::Delivery(reason)
    }

    /// Fire-and-forget delivery; true when the message was accepted
    pub async fn tell<P: Any + Send>(&self, id: i64, kind: impl Into<String>, payload: P) -> bool {
        match self.send(id, Message::new(kind, payload)).await {
            Ok(()) => true,
            Err(err) => {
                debug!(kind = %self.inner.kind, entity_id = id, error = %err, "Tell rejected");
                false
            }
        }
    }

    /// Request/response delivery with a caller-side timeout
    pub async fn ask<P, R>(
        &self,
        id: i64,
        kind: impl Into<String>,
        payload: P,
        timeout: Duration,
    ) -> Result<R, AskError>
    where
        P: Any + Send,
        R: Any + Send,
    {
        let (sink, reply) = ReplySink::channel();
        self.send(id, Message::with_reply(kind, payload, sink)).await?;

        let outcome = tokio::time::timeout(timeout, reply)
            .await
            .map_err(|_| AskError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?;
        let value = outcome.map_err(|_| AskError::ReplyDropped)??;

        value
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| AskError::ReplyMismatch {
                expected: std::any::type_name::<R>(),
            })
    }

    /// Deactivate and drop one resident actor
    pub async fn evict(&self, id: i64) -> bool {
        match self.get_if_present(id) {
            Some(actor) => self.evict_actor(&actor).await,
            None => false,
        }
    }

    async fn evict_actor(&self, actor: &Arc<EntityActor<S>>) -> bool {
        let deactivated = actor.deactivate().await;
        if actor.lifecycle() == LifecycleState::Stopped {
            self.inner.remove_if_same(actor);
        }
        if deactivated {
            self.inner.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
        deactivated
    }

    /// Evict every actor idle for at least `max_idle`
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let candidates: Vec<Arc<EntityActor<S>>> = self
            .inner
            .actors
            .iter()
            .filter(|e| e.value().is_idle_for(max_idle))
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut evicted = 0;
        for actor in candidates {
            if self.evict_actor(&actor).await {
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(
                kind = %self.inner.kind,
                evicted,
                resident = self.len(),
                "Evicted idle actors"
            );
        }
        evicted
    }

    /// Evict least-recently-active idle actors above `max_actors`
    fn enforce_capacity(&self, newest: &Arc<EntityActor<S>>) {
        let Some(max_actors) = self.inner.config.max_actors else {
            return;
        };
        let excess = self.inner.actors.len().saturating_sub(max_actors);
        if excess == 0 {
            return;
        }

        let mut idle: Vec<(Instant, Arc<EntityActor<S>>)> = self
            .inner
            .actors
            .iter()
            .filter(|e| !Arc::ptr_eq(e.value(), newest) && e.value().is_idle())
            .map(|e| (e.value().last_active(), Arc::clone(e.value())))
            .collect();
        idle.sort_by_key(|(last_active, _)| *last_active);
        idle.truncate(excess);

        if idle.is_empty() {
            debug!(
                kind = %self.inner.kind,
                resident = self.len(),
                max_actors,
                "Over capacity but no idle actor to evict"
            );
            return;
        }

        let registry = self.clone();
        tokio::spawn(async move {
            for (_, actor) in idle {
                if registry.evict_actor(&actor).await {
                    debug!(actor_id = %actor.identity(), "Evicted actor under capacity pressure");
                }
            }
        });
    }

    /// Save every dirty actor whose last save is at least `interval` old
    pub async fn persist_dirty(&self, interval: Duration) -> usize {
        let actors: Vec<Arc<EntityActor<S>>> =
            self.inner.actors.iter().map(|e| Arc::clone(e.value())).collect();

        let mut persisted = 0;
        for actor in actors {
            if actor.persist_if_due(interval).await {
                persisted += 1;
            }
        }
        persisted
    }

    /// One persistence sweep followed by one idle-eviction sweep
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let started = Instant::now();
        let persisted = self.persist_dirty(self.inner.config.persist_interval).await;
        let evicted = self.evict_idle(self.inner.config.idle_timeout).await;

        debug!(
            kind = %self.inner.kind,
            persisted,
            evicted,
            resident = self.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Maintenance pass complete"
        );
        MaintenanceReport { persisted, evicted }
    }

    /// Run maintenance every `maintenance_interval` until shutdown
    pub fn start_maintenance(&self) {
        let registry = Arc::downgrade(&self.inner);
        let period = self.inner.config.maintenance_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = registry.upgrade() else {
                    break;
                };
                if !inner.is_accepting() {
                    break;
                }
                ActorRegistry { inner }.run_maintenance().await;
            }
        });

        if let Some(previous) = self.inner.maintenance.lock().replace(handle) {
            previous.abort();
        }
        debug!(kind = %self.inner.kind, period_ms = period.as_millis() as u64, "Maintenance started");
    }

    pub fn stop_maintenance(&self) {
        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.abort();
        }
    }

    /// Persist and deactivate every resident actor, then wait for running
    /// drain turns
    ///
    /// Actors are handled concurrently, each against the same
    /// `shutdown_timeout` deadline, so one stuck actor cannot hold up the
    /// others. Actors still busy at the deadline have their drain turns
    /// aborted and are dropped; each one is logged at error level.
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.inner.accepting.swap(false, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        info!(kind = %self.inner.kind, resident = self.len(), "Shutting down actor registry");
        self.stop_maintenance();

        let timeout = self.inner.config.shutdown_timeout;
        let deadline = Instant::now() + timeout;
        let actors: Vec<Arc<EntityActor<S>>> =
            self.inner.actors.iter().map(|e| Arc::clone(e.value())).collect();

        let outcomes = futures::future::join_all(actors.iter().map(|actor| async move {
            let wind_down = async {
                let persisted = actor.persist_if_due(Duration::ZERO).await;
                let deactivated = actor.deactivate().await;
                (persisted, deactivated)
            };
            let outcome = tokio::time::timeout_at(deadline, wind_down).await.ok();
            if outcome.is_some() {
                self.inner.remove_if_same(actor);
            }
            outcome
        }))
        .await;

        let mut persisted = 0;
        let mut deactivated = 0;
        let mut stuck = Vec::new();
        for (actor, outcome) in actors.into_iter().zip(outcomes) {
            match outcome {
                Some((saved, stopped)) => {
                    persisted += usize::from(saved);
                    deactivated += usize::from(stopped);
                }
                None => stuck.push(actor),
            }
        }

        let drained = tokio::time::timeout_at(deadline, async {
            loop {
                let notified = self.inner.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        let timed_out = !drained || !stuck.is_empty();
        let aborted = if drained { 0 } else { self.inner.executor.abort_all() };
        if timed_out {
            warn!(
                kind = %self.inner.kind,
                aborted,
                stuck = stuck.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown grace period elapsed, aborted remaining drain turns"
            );
        }

        let mut unpersisted = 0;
        for actor in &stuck {
            if actor.lifecycle() != LifecycleState::Stopped {
                unpersisted += 1;
                error!(
                    actor_id = %actor.identity(),
                    lifecycle = ?actor.lifecycle(),
                    "Actor did not finish before the shutdown deadline, state not persisted"
                );
            }
            self.inner.remove_if_same(actor);
        }

        let report = ShutdownReport {
            persisted,
            deactivated,
            unpersisted,
            aborted,
            timed_out,
        };
        info!(
            kind = %self.inner.kind,
            persisted = report.persisted,
            deactivated = report.deactivated,
            unpersisted = report.unpersisted,
            aborted = report.aborted,
            "Actor registry shutdown complete"
        );
        report
    }
}

impl<S> fmt::Debug for ActorRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRegistry")
            .field("kind", &self.inner.kind)
            .field("resident", &self.inner.actors.len())
            .field("handlers", &self.inner.handlers)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`ActorRegistry`]
pub struct RegistryBuilder<S> {
    kind: String,
    store: Option<Arc<dyn StateStore<S>>>,
    handlers: HandlerTable<S>,
    actor_supervisor: Option<SharedPolicy>,
    default_supervisor: Option<SharedPolicy>,
    escalation: Option<Arc<dyn EscalationHandler>>,
    cleanup: Option<CleanupHook<S>>,
    config: RegistryConfig,
    executor: Option<Arc<dyn Executor>>,
    metrics: Option<Arc<RuntimeMetrics>>,
}

impl<S: Send + Sync + 'static> RegistryBuilder<S> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            store: None,
            handlers: HandlerTable::new(),
            actor_supervisor: None,
            default_supervisor: None,
            escalation: None,
            cleanup: None,
            config: RegistryConfig::default(),
            executor: None,
            metrics: None,
        }
    }

    /// Persistence collaborator (required)
    pub fn store<T: StateStore<S>>(mut self, store: Arc<T>) -> Self {
        let store: Arc<dyn StateStore<S>> = store;
        self.store = Some(store);
        self
    }

    pub fn handlers(mut self, handlers: HandlerTable<S>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Override installed on every instance; wins over [`supervisor`](Self::supervisor)
    pub fn actor_supervisor(mut self, policy: impl SupervisorPolicy) -> Self {
        self.actor_supervisor = Some(Arc::new(policy));
        self
    }

    /// Registry-wide default policy
    pub fn supervisor(mut self, policy: impl SupervisorPolicy) -> Self {
        self.default_supervisor = Some(Arc::new(policy));
        self
    }

    pub fn escalation(mut self, handler: impl EscalationHandler) -> Self {
        self.escalation = Some(Arc::new(handler));
        self
    }

    /// Hook run with the final state of every deactivated actor
    pub fn on_deactivate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActorIdentity, &S) + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(hook));
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure from loaded settings
    pub fn settings(mut self, settings: &RegistrySettings) -> Result<Self, ConfigError> {
        self.config = RegistryConfig::try_from(settings)?;
        Ok(self)
    }

    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Share counters with other registries
    pub fn metrics(mut self, metrics: Arc<RuntimeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ActorRegistry<S>, ConfigError> {
        if self.kind.is_empty() {
            return Err(ConfigError::new("entity kind must not be empty", "kind"));
        }
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| ConfigError::new("a state store is required", "store"))?;
        let executor: Arc<dyn Executor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(TokioExecutor::try_current().ok_or_else(|| {
                ConfigError::new("no executor given and no tokio runtime running", "executor")
            })?),
        };

        debug!(
            kind = %self.kind,
            handlers = ?self.handlers,
            mailbox_capacity = self.config.mailbox_capacity,
            backpressure = ?self.config.backpressure,
            "Building actor registry"
        );

        Ok(ActorRegistry {
            inner: Arc::new(RegistryInner {
                kind: Arc::from(self.kind),
                actors: DashMap::new(),
                handlers: self.handlers,
                store,
                actor_supervisor: self.actor_supervisor,
                default_supervisor: self.default_supervisor,
                escalation: self.escalation,
                cleanup: self.cleanup,
                config: self.config,
                executor,
                metrics: self.metrics.unwrap_or_default(),
                accepting: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                maintenance: Mutex::new(None),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerContext;
    use crate::mailbox::BackpressurePolicy;
    use crate::persistence::InMemoryStore;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Guild {
        members: Vec<i64>,
    }

    fn handlers() -> HandlerTable<Guild> {
        HandlerTable::new()
            .on("join", |ctx: &mut HandlerContext<'_, Guild>, player: i64| {
                ctx.state_mut().members.push(player);
                Ok(ctx.state().members.len())
            })
            .unwrap()
            .on("size", |ctx: &mut HandlerContext<'_, Guild>, _: ()| Ok(ctx.state().members.len()))
            .unwrap()
    }

    fn registry(store: &Arc<InMemoryStore<Guild>>, config: RegistryConfig) -> ActorRegistry<Guild> {
        ActorRegistry::builder("guild")
            .store(Arc::clone(store))
            .handlers(handlers())
            .config(config)
            .build()
            .unwrap()
    }

    fn seeded(ids: impl IntoIterator<Item = i64>) -> Arc<InMemoryStore<Guild>> {
        let store = Arc::new(InMemoryStore::new());
        for id in ids {
            store.insert(id, Guild::default());
        }
        store
    }

    #[tokio::test]
    async fn test_builder_requires_store() {
        let err = ActorRegistry::<Guild>::builder("guild").build().unwrap_err();
        assert_eq!(err.field, "store");
    }

    #[tokio::test]
    async fn test_concurrent_misses_activate_once() {
        let store = seeded([1]);
        let registry = registry(&store, RegistryConfig::default());

        let lookups = (0..16).map(|_| registry.get_or_create(1));
        let actors = futures::future::join_all(lookups).await;

        let first = actors[0].as_ref().unwrap();
        for actor in &actors {
            assert!(Arc::ptr_eq(first, actor.as_ref().unwrap()));
        }
        assert_eq!(store.load_count(), 1);
        assert_eq!(registry.stats().activations, 1);
    }

    #[tokio::test]
    async fn test_tell_to_missing_entity_fails() {
        let store = seeded([]);
        let registry = registry(&store, RegistryConfig::default());

        assert!(!registry.tell(404, "join", 1i64).await);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().activation_failures, 1);
    }

    #[tokio::test]
    async fn test_ask_reply_mismatch() {
        let store = seeded([1]);
        let registry = registry(&store, RegistryConfig::default());

        let err = registry
            .ask::<(), String>(1, "size", (), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::ReplyMismatch { .. }));
    }

    #[tokio::test]
    async fn test_ask_unknown_kind() {
        let store = seeded([1]);
        let registry = registry(&store, RegistryConfig::default());

        let err = registry
            .ask::<(), usize>(1, "disband", (), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Handler(HandlerError::UnknownKind { .. })));
        // unknown kinds are ordinary failures; the actor keeps running
        let size: usize = registry.ask(1, "size", (), Duration::from_secs(1)).await.unwrap();
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_send_replaces_stopped_instance() {
        let store = seeded([1]);
        let registry = registry(&store, RegistryConfig::default());

        let first = registry.get_or_create(1).await.unwrap();
        first.deactivate().await;
        // stale entry still resident until someone notices
        assert!(registry.get_if_present(1).is_some());

        assert!(registry.tell(1, "join", 9i64).await);
        let second = registry.get_if_present(1).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_capacity_eviction_prefers_least_recent() {
        let store = seeded(1..=3);
        let config = RegistryConfig {
            max_actors: Some(2),
            ..RegistryConfig::default()
        };
        let registry = registry(&store, config);

        registry.get_or_create(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.get_or_create(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.get_or_create(3).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.len() > 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let mut ids = registry.resident_ids();
        ids.sort();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(registry.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_shutdown_persists_and_refuses() {
        let store = seeded([1, 2]);
        let registry = registry(&store, RegistryConfig::default());

        let _: usize = registry.ask(1, "join", 10i64, Duration::from_secs(1)).await.unwrap();
        let _: usize = registry.ask(2, "size", (), Duration::from_secs(1)).await.unwrap();

        let report = registry.shutdown().await;
        assert_eq!(report.persisted, 1);
        assert_eq!(report.deactivated, 2);
        assert!(!report.timed_out);
        assert!(registry.is_empty());
        assert_eq!(store.get(1).unwrap().members, vec![10]);

        assert!(!registry.tell(1, "join", 11i64).await);
        assert!(matches!(
            registry.get_or_create(1).await,
            Err(ActivationError::ShuttingDown { .. })
        ));
        // second shutdown is a no-op
        assert_eq!(registry.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_settings_configure_backpressure() {
        let settings = RegistrySettings {
            mailbox_capacity: 2,
            backpressure: runtime_config::BackpressureSetting::DropOldest,
            ..RegistrySettings::default()
        };
        let registry = ActorRegistry::builder("guild")
            .store(seeded([]))
            .handlers(handlers())
            .settings(&settings)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(registry.config().mailbox_capacity, 2);
        assert_eq!(registry.config().backpressure, BackpressurePolicy::DropOldest);
    }
}
