//! Entity Actor
//!
//! One instance per resident entity. The instance owns the entity state in a
//! private cell guarded by its turn lock; the drain turn, deactivation and
//! persistence are the only code paths that take the lock, and the handler
//! table is the only code that sees the state.
//!
//! ## Scheduling
//!
//! Producers only enqueue. The first producer to find the actor idle flips
//! the `scheduled` flag and submits one drain turn to the registry executor.
//! A turn processes at most `batch_size` messages, clears the flag and, if
//! work remains, submits a fresh turn instead of looping.
//!
//! ## Lifecycle
//!
//! `Created -> Running -> Stopping -> Stopped`, never backwards. A Stopped
//! instance is discarded; the registry activates a fresh one on demand.

use crate::dispatch::HandlerContext;
use crate::error::{ActivationError, DeliveryError, HandlerError};
use crate::identity::ActorIdentity;
use crate::mailbox::{Admission, Mailbox, Rejected};
use crate::message::Message;
use crate::registry::RegistryInner;
use crate::supervisor::{self, Directive, FailureContext, SharedPolicy};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex as TurnLock, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Actor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    Running = 1,
    /// Refusing new messages, draining what is queued
    Stopping = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct ActorCell<S> {
    /// `None` before activation and after deactivation
    state: Option<S>,
    dirty: bool,
    consecutive_errors: u32,
    last_persist: Instant,
}

/// A resident entity actor
pub struct EntityActor<S> {
    identity: ActorIdentity,
    lifecycle: AtomicU8,
    /// Wakes callers waiting for activation or deactivation to settle
    transitions: Notify,
    mailbox: Mailbox<Message>,
    scheduled: AtomicBool,
    cell: TurnLock<ActorCell<S>>,
    last_active: Mutex<Instant>,
    supervisor: RwLock<Option<SharedPolicy>>,
    activation_error: Mutex<Option<String>>,
    host: Weak<RegistryInner<S>>,
}

impl<S: Send + Sync + 'static> EntityActor<S> {
    pub(crate) fn new(identity: ActorIdentity, host: &Arc<RegistryInner<S>>) -> Arc<Self> {
        let config = &host.config;
        Arc::new(Self {
            identity,
            lifecycle: AtomicU8::new(LifecycleState::Created as u8),
            transitions: Notify::new(),
            mailbox: Mailbox::new(config.mailbox_capacity, config.backpressure),
            scheduled: AtomicBool::new(false),
            cell: TurnLock::new(ActorCell {
                state: None,
                dirty: false,
                consecutive_errors: 0,
                last_persist: Instant::now(),
            }),
            last_active: Mutex::new(Instant::now()),
            supervisor: RwLock::new(host.actor_supervisor.clone()),
            activation_error: Mutex::new(None),
            host: Arc::downgrade(host),
        })
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == LifecycleState::Running
    }

    pub fn mailbox(&self) -> &Mailbox<Message> {
        &self.mailbox
    }

    /// Whether a drain turn is currently submitted or running
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Time of the last accepted delivery (or activation)
    pub fn last_active(&self) -> Instant {
        *self.last_active.lock()
    }

    /// Reason recorded by a failed activation
    pub fn activation_error(&self) -> Option<String> {
        self.activation_error.lock().clone()
    }

    /// Install or clear this instance's supervisor override
    pub fn set_supervisor(&self, policy: Option<SharedPolicy>) {
        *self.supervisor.write() = policy;
    }

    /// Running, nothing queued, no turn in flight
    pub fn is_idle(&self) -> bool {
        self.is_running() && !self.is_scheduled() && self.mailbox.is_empty()
    }

    pub fn is_idle_for(&self, max_idle: Duration) -> bool {
        self.is_idle() && self.last_active().elapsed() >= max_idle
    }

    /// Read the state under the turn lock; `None` unless activated
    pub async fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        let cell = self.cell.lock().await;
        cell.state.as_ref().map(f)
    }

    pub async fn is_dirty(&self) -> bool {
        self.cell.lock().await.dirty
    }

    pub async fn consecutive_errors(&self) -> u32 {
        self.cell.lock().await.consecutive_errors
    }

    /// Flag state for the next persistence pass
    pub async fn mark_dirty(&self) {
        self.cell.lock().await.dirty = true;
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    fn set_lifecycle(&self, state: LifecycleState) {
        self.lifecycle.store(state as u8, Ordering::Release);
        self.transitions.notify_waiters();
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let moved = self
            .lifecycle
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            self.transitions.notify_waiters();
        }
        moved
    }

    /// Move Created/Running to Stopping; `None` if already stopping
    fn begin_stop(&self) -> Option<LifecycleState> {
        for from in [LifecycleState::Running, LifecycleState::Created] {
            if self.transition(from, LifecycleState::Stopping) {
                return Some(from);
            }
        }
        None
    }

    /// Wait until the instance is Running or Stopped
    pub(crate) async fn settled(&self) -> LifecycleState {
        loop {
            let notified = self.transitions.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.lifecycle() {
                state @ (LifecycleState::Running | LifecycleState::Stopped) => return state,
                LifecycleState::Created | LifecycleState::Stopping => {}
            }
            notified.await;
        }
    }

    /// Load state and enter Running
    ///
    /// If the calling future is dropped before this returns, the instance is
    /// removed and marked Stopped so waiting callers activate a fresh one.
    pub(crate) async fn activate(self: &Arc<Self>, host: &RegistryInner<S>) -> Result<(), ActivationError> {
        let started = Instant::now();
        let mut pending = PendingActivation {
            actor: self,
            host,
            armed: true,
        };
        let mut cell = self.cell.lock().await;

        let loaded = match host.store.load(&self.identity).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(ActivationError::NotFound {
                identity: self.identity.clone(),
            }),
            Err(source) => Err(ActivationError::Load {
                identity: self.identity.clone(),
                source,
            }),
        };

        match loaded {
            Ok(state) => {
                cell.state = Some(state);
                cell.dirty = false;
                cell.consecutive_errors = 0;
                cell.last_persist = Instant::now();
                drop(cell);
                pending.armed = false;

                self.touch();
                if !self.transition(LifecycleState::Created, LifecycleState::Running) {
                    return Err(ActivationError::Abandoned {
                        identity: self.identity.clone(),
                        reason: "stopped during activation".to_string(),
                    });
                }
                debug!(
                    actor_id = %self.identity,
                    activation_ms = started.elapsed().as_millis() as u64,
                    "Actor activated"
                );
                Ok(())
            }
            Err(err) => {
                pending.armed = false;
                warn!(actor_id = %self.identity, error = %err, "Actor activation failed");
                *self.activation_error.lock() = Some(err.to_string());
                self.mailbox.close();
                self.set_lifecycle(LifecycleState::Stopped);
                Err(err)
            }
        }
    }

    /// Offer a message; rejections fail the message's reply sink
    pub async fn deliver(self: &Arc<Self>, message: Message) -> Result<(), DeliveryError> {
        self.offer(message).await.map_err(|rejected| {
            if let Some(host) = self.host.upgrade() {
                host.metrics.deliveries_rejected.fetch_add(1, Ordering::Relaxed);
            }
            let reason = rejected.reason;
            rejected.message.reject(HandlerError::Rejected { reason });
            reason
        })
    }

    /// Offer a message, handing it back on rejection
    pub(crate) async fn offer(self: &Arc<Self>, message: Message) -> Result<(), Rejected<Message>> {
        let host = match self.host.upgrade() {
            Some(host) if host.is_accepting() => host,
            _ => {
                return Err(Rejected {
                    message,
                    reason: DeliveryError::ShuttingDown,
                })
            }
        };
        if !self.is_running() {
            return Err(Rejected {
                message,
                reason: DeliveryError::NotRunning,
            });
        }

        match self.mailbox.enqueue(message).await {
            Ok(admission) => {
                if let Admission::Evicted(oldest) = admission {
                    host.metrics.messages_evicted.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        actor_id = %self.identity,
                        message_kind = oldest.kind(),
                        "Dropped oldest queued message"
                    );
                    oldest.reject(HandlerError::Evicted);
                }
                self.touch();
                self.schedule_on(&host);
                Ok(())
            }
            Err(rejected) => {
                debug!(
                    actor_id = %self.identity,
                    message_kind = rejected.message.kind(),
                    reason = %rejected.reason,
                    "Mailbox rejected message"
                );
                Err(rejected)
            }
        }
    }

    fn schedule_on(self: &Arc<Self>, host: &Arc<RegistryInner<S>>) {
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if !host.submit(Arc::clone(self)) {
            self.scheduled.store(false, Ordering::SeqCst);
        }
    }

    /// One drain turn, run by the executor
    pub(crate) async fn run_turn(self: Arc<Self>, host: Arc<RegistryInner<S>>) {
        {
            let mut cell = self.cell.lock().await;
            if self.is_running() {
                host.metrics.drain_turns.fetch_add(1, Ordering::Relaxed);
                self.drain_batch(&host, &mut cell).await;
            }
        }

        self.scheduled.store(false, Ordering::SeqCst);
        // A producer that lost the race for the flag relies on this check.
        if self.is_running() && !self.mailbox.is_empty() {
            self.schedule_on(&host);
        }
    }

    async fn drain_batch(self: &Arc<Self>, host: &RegistryInner<S>, cell: &mut ActorCell<S>) {
        for _ in 0..host.config.batch_size {
            if !self.is_running() {
                return;
            }
            let Some(message) = self.mailbox.pop() else {
                return;
            };

            match self.process(host, cell, message, false) {
                None | Some(Directive::Resume) | Some(Directive::Escalate) => {}
                Some(Directive::Restart) => {
                    if !self.restart(host, cell).await {
                        self.stop_in_turn(host, cell).await;
                        return;
                    }
                }
                Some(Directive::Stop) => {
                    self.stop_in_turn(host, cell).await;
                    return;
                }
            }
        }
    }

    /// Run one message through its handler; returns the directive on failure
    fn process(
        &self,
        host: &RegistryInner<S>,
        cell: &mut ActorCell<S>,
        message: Message,
        stopping: bool,
    ) -> Option<Directive> {
        let (kind, payload, reply) = message.into_parts();
        let Some(state) = cell.state.as_mut() else {
            if let Some(reply) = reply {
                reply.fail(HandlerError::Stopped);
            }
            return None;
        };

        let started = std::time::Instant::now();
        let mut ctx = HandlerContext::new(&self.identity, state, &mut cell.dirty);
        let result = host.handlers.dispatch(&mut ctx, &kind, payload);

        match result {
            Ok(value) => {
                cell.consecutive_errors = 0;
                host.metrics.record_message_handled(started.elapsed());
                if let Some(reply) = reply {
                    reply.succeed(value);
                }
                None
            }
            Err(error) => {
                cell.consecutive_errors = cell.consecutive_errors.saturating_add(1);
                let mut directive = self.decide(host, &kind, &error, cell.consecutive_errors);
                if stopping && matches!(directive, Directive::Restart | Directive::Stop) {
                    directive = Directive::Resume;
                }
                host.metrics.record_directive(directive);

                warn!(
                    actor_id = %self.identity,
                    message_kind = %kind,
                    error = %error,
                    error_category = error.category(),
                    consecutive_errors = cell.consecutive_errors,
                    directive = %directive,
                    "Actor message processing failed"
                );

                if directive == Directive::Escalate {
                    host.escalate(&self.identity, &kind, &error);
                }
                if let Some(reply) = reply {
                    reply.fail(error);
                }
                Some(directive)
            }
        }
    }

    fn decide(
        &self,
        host: &RegistryInner<S>,
        kind: &str,
        error: &HandlerError,
        consecutive_errors: u32,
    ) -> Directive {
        let actor_override = self.supervisor.read().clone();
        let policy = supervisor::resolve(actor_override.as_ref(), host.default_supervisor.as_ref());
        policy.decide(&FailureContext {
            identity: &self.identity,
            message_kind: kind,
            error,
            consecutive_errors,
        })
    }

    /// Reload state in place; false means the actor must stop
    async fn restart(&self, host: &RegistryInner<S>, cell: &mut ActorCell<S>) -> bool {
        match host.store.load(&self.identity).await {
            Ok(Some(state)) => {
                cell.state = Some(state);
                cell.dirty = false;
                cell.consecutive_errors = 0;
                cell.last_persist = Instant::now();
                info!(
                    actor_id = %self.identity,
                    queued = self.mailbox.len(),
                    "Actor restarted from persisted state"
                );
                true
            }
            Ok(None) => {
                host.metrics.restart_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    actor_id = %self.identity,
                    "Restart found no persisted state, stopping actor"
                );
                false
            }
            Err(err) => {
                host.metrics.restart_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    actor_id = %self.identity,
                    error = %err,
                    "Restart reload failed, stopping actor"
                );
                false
            }
        }
    }

    async fn stop_in_turn(self: &Arc<Self>, host: &RegistryInner<S>, cell: &mut ActorCell<S>) {
        if self.begin_stop().is_none() {
            return;
        }
        self.mailbox.close();
        self.finish(host, cell).await;
        // Removal precedes Stopped so waiters never see a stale resident entry.
        host.remove_if_same(self);
        self.set_lifecycle(LifecycleState::Stopped);
    }

    /// Drain leftovers, persist and run the cleanup hook
    async fn finish(&self, host: &RegistryInner<S>, cell: &mut ActorCell<S>) {
        let mut drained = 0usize;
        while let Some(message) = self.mailbox.pop() {
            self.process(host, cell, message, true);
            drained += 1;
        }

        if cell.dirty && !self.save(host, cell).await {
            error!(
                actor_id = %self.identity,
                "Dirty state discarded after final save failed"
            );
        }

        if let (Some(hook), Some(state)) = (host.cleanup.as_ref(), cell.state.as_ref()) {
            hook(&self.identity, state);
        }
        cell.state = None;

        host.metrics.deactivations.fetch_add(1, Ordering::Relaxed);
        info!(actor_id = %self.identity, drained, "Actor deactivated");
    }

    async fn save(&self, host: &RegistryInner<S>, cell: &mut ActorCell<S>) -> bool {
        let Some(state) = cell.state.as_ref() else {
            return false;
        };

        match host.store.save(&self.identity, state).await {
            Ok(()) => {
                cell.dirty = false;
                cell.last_persist = Instant::now();
                host.metrics.record_save(true);
                debug!(actor_id = %self.identity, "Actor state persisted");
                true
            }
            Err(err) => {
                host.metrics.record_save(false);
                warn!(
                    actor_id = %self.identity,
                    error = %err,
                    "Failed to persist actor state, will retry"
                );
                false
            }
        }
    }

    /// Save if dirty and `interval` has passed since the last save
    pub async fn persist_if_due(&self, interval: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(host) = self.host.upgrade() else {
            return false;
        };

        let mut cell = self.cell.lock().await;
        if !cell.dirty || cell.last_persist.elapsed() < interval {
            return false;
        }
        self.save(&host, &mut cell).await
    }

    /// Stop accepting messages, drain, persist and enter Stopped
    ///
    /// Returns false when another caller already started the deactivation.
    pub async fn deactivate(&self) -> bool {
        if self.begin_stop().is_none() {
            return false;
        }
        self.mailbox.close();

        let Some(host) = self.host.upgrade() else {
            warn!(actor_id = %self.identity, "Registry gone, deactivating without persistence");
            self.set_lifecycle(LifecycleState::Stopped);
            return true;
        };

        let mut cell = self.cell.lock().await;
        self.finish(&host, &mut cell).await;
        self.set_lifecycle(LifecycleState::Stopped);
        true
    }
}

/// Abandons a Created instance whose activation did not run to completion
struct PendingActivation<'a, S: Send + Sync + 'static> {
    actor: &'a Arc<EntityActor<S>>,
    host: &'a RegistryInner<S>,
    armed: bool,
}

impl<S: Send + Sync + 'static> Drop for PendingActivation<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let actor = self.actor;
        let panicked = std::thread::panicking();
        if panicked {
            // Waiters surface this instead of retrying a load that panics
            *actor.activation_error.lock() = Some("activation panicked".to_string());
        }

        actor.mailbox.close();
        self.host.remove_if_same(actor);
        actor.transition(LifecycleState::Created, LifecycleState::Stopped);
        self.host
            .metrics
            .activation_failures
            .fetch_add(1, Ordering::Relaxed);
        warn!(actor_id = %actor.identity, panicked, "Activation abandoned before completion");
    }
}

impl<S> fmt::Debug for EntityActor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityActor")
            .field("identity", &self.identity)
            .field(
                "lifecycle",
                &LifecycleState::from_u8(self.lifecycle.load(Ordering::Acquire)),
            )
            .field("mailbox", &self.mailbox)
            .field("scheduled", &self.scheduled.load(Ordering::Relaxed))
            .finish()
    }
}
