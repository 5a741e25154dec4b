//! Entity Actor Runtime
//!
//! One logical actor per stateful game entity (player, guild, ...). Each
//! actor exclusively owns its state and mutates it only while draining its
//! own mailbox, so the hot path takes no locks shared between entities.
//!
//! # Architecture
//!
//! ```text
//!  producers ──tell/ask──▶ ActorRegistry ──get_or_create──▶ EntityActor
//!                              │                             │  mailbox (backpressure)
//!                              │ maintenance cadence         │  drain turn ≤ batch_size
//!                              ▼                             ▼
//!                         StateStore ◀──load/save──── HandlerTable + SupervisorPolicy
//! ```
//!
//! - Activation is lazy: the first message to an id loads its state.
//! - Handler failures and panics are contained and routed through a
//!   supervisor policy (Resume, Restart, Stop, Escalate).
//! - Dirty state is saved on a cadence and always before deactivation.
//!
//! # Example
//!
//! ```rust,no_run
//! use entity_actors::{ActorRegistry, HandlerContext, HandlerTable, InMemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Clone, Default)]
//! struct Counter {
//!     value: u64,
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! store.insert(42, Counter::default());
//!
//! let handlers = HandlerTable::new().on("increment", |ctx: &mut HandlerContext<'_, Counter>, _: ()| {
//!     ctx.state_mut().value += 1;
//!     Ok(ctx.state().value)
//! })?;
//!
//! let counters = ActorRegistry::builder("counter")
//!     .store(store)
//!     .handlers(handlers)
//!     .build()?;
//!
//! counters.tell(42, "increment", ()).await;
//! let value: u64 = counters.ask(42, "increment", (), Duration::from_secs(1)).await?;
//! assert_eq!(value, 2);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod identity;
pub mod mailbox;
pub mod message;
pub mod metrics;
pub mod persistence;
pub mod registry;
pub mod supervisor;
pub mod system;

pub use actor::{EntityActor, LifecycleState};
pub use config::RegistryConfig;
pub use dispatch::{HandlerContext, HandlerTable};
pub use error::{
    ActivationError, AskError, ConfigError, DeliveryError, DispatchError, HandlerError,
    PersistenceError, SendError, SystemError,
};
pub use executor::{Executor, TokioExecutor};
pub use identity::ActorIdentity;
pub use mailbox::{Admission, BackpressurePolicy, Mailbox, Rejected};
pub use message::{Message, Payload, ReplySink};
pub use metrics::{RuntimeMetrics, RuntimeStats, SupervisionStats};
pub use persistence::{InMemoryStore, StateStore};
pub use registry::{ActorRegistry, MaintenanceReport, RegistryBuilder, ShutdownReport};
pub use supervisor::{
    AlwaysRestart, AlwaysResume, AlwaysStop, Directive, EscalationHandler, FailureContext,
    SharedPolicy, SupervisorPolicy, ThresholdPolicy,
};
pub use system::ActorSystem;

/// Result alias for handler bodies
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
