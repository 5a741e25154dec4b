//! Actor System
//!
//! Explicit handle over one registry per entity kind. There is no global
//! instance: whoever needs cross-kind lookups is handed the system.
//!
//! ```rust,no_run
//! # use entity_actors::{ActorSystem, HandlerTable, InMemoryStore};
//! # use std::sync::Arc;
//! # #[derive(Clone, Default)] struct Player { level: u32 }
//! # async fn run() -> anyhow::Result<()> {
//! let system = ActorSystem::new();
//! let players = system
//!     .registry_builder::<Player>("player")?
//!     .store(Arc::new(InMemoryStore::new()))
//!     .handlers(HandlerTable::new())
//!     .build()?;
//! system.register(players)?;
//!
//! let players = system.registry::<Player>("player").expect("registered above");
//! players.tell(42, "level_up", ()).await;
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::error::SystemError;
use crate::metrics::RuntimeStats;
use crate::registry::{ActorRegistry, RegistryBuilder, ShutdownReport};
use dashmap::DashMap;
use futures::future::BoxFuture;
use runtime_config::RuntimeConfig;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Type-erased view of a registry
trait ManagedRegistry: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn resident(&self) -> usize;
    fn stats(&self) -> RuntimeStats;
    fn start_maintenance(&self);
    fn shutdown(&self) -> BoxFuture<'_, ShutdownReport>;
}

impl<S: Send + Sync + 'static> ManagedRegistry for ActorRegistry<S> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn resident(&self) -> usize {
        self.len()
    }

    fn stats(&self) -> RuntimeStats {
        ActorRegistry::stats(self)
    }

    fn start_maintenance(&self) {
        ActorRegistry::start_maintenance(self)
    }

    fn shutdown(&self) -> BoxFuture<'_, ShutdownReport> {
        Box::pin(ActorRegistry::shutdown(self))
    }
}

/// Handle owning the registries of every entity kind
pub struct ActorSystem {
    system_id: String,
    config: RuntimeConfig,
    registries: DashMap<String, Arc<dyn ManagedRegistry>>,
}

impl ActorSystem {
    /// System with default settings for every kind
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// System whose registry builders start from `config`
    pub fn with_config(config: RuntimeConfig) -> Self {
        let system_id = format!("system-{}", Uuid::new_v4());
        info!(system_id = %system_id, "Creating actor system");
        Self {
            system_id,
            config,
            registries: DashMap::new(),
        }
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Builder pre-configured with the settings for `kind`
    pub fn registry_builder<S: Send + Sync + 'static>(
        &self,
        kind: &str,
    ) -> Result<RegistryBuilder<S>, SystemError> {
        let builder = ActorRegistry::builder(kind).settings(self.config.settings_for(kind))?;
        Ok(builder)
    }

    /// Add a registry; each entity kind may be registered once
    pub fn register<S: Send + Sync + 'static>(&self, registry: ActorRegistry<S>) -> Result<(), SystemError> {
        let kind = registry.kind().to_string();
        match self.registries.entry(kind.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SystemError::DuplicateKind { kind }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(registry));
                debug!(system_id = %self.system_id, kind = %kind, "Registered actor registry");
                Ok(())
            }
        }
    }

    /// Registry for `kind`; `None` if absent or registered with another state type
    pub fn registry<S: Send + Sync + 'static>(&self, kind: &str) -> Option<ActorRegistry<S>> {
        let entry = self.registries.get(kind)?;
        entry.as_any().downcast_ref::<ActorRegistry<S>>().cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.registries.iter().map(|e| e.key().clone()).collect()
    }

    /// Resident actors across every kind
    pub fn resident(&self) -> usize {
        self.registries.iter().map(|e| e.value().resident()).sum()
    }

    pub fn stats(&self) -> HashMap<String, RuntimeStats> {
        self.registries
            .iter()
            .map(|e| (e.key().clone(), e.value().stats()))
            .collect()
    }

    /// Start the maintenance cadence of every registry
    pub fn start_maintenance(&self) {
        for entry in self.registries.iter() {
            entry.value().start_maintenance();
        }
    }

    /// Shut every registry down concurrently
    pub async fn shutdown(&self) -> HashMap<String, ShutdownReport> {
        info!(system_id = %self.system_id, resident = self.resident(), "Shutting down actor system");

        let registries: Vec<(String, Arc<dyn ManagedRegistry>)> = self
            .registries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let reports = futures::future::join_all(
            registries
                .iter()
                .map(|(_, registry)| registry.shutdown()),
        )
        .await;

        info!(system_id = %self.system_id, "Actor system shutdown complete");
        registries
            .into_iter()
            .map(|(kind, _)| kind)
            .zip(reports)
            .collect()
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("system_id", &self.system_id)
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{HandlerContext, HandlerTable};
    use crate::persistence::InMemoryStore;
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    struct Player {
        level: u32,
    }

    #[derive(Debug, Clone, Default)]
    struct Guild {
        name: String,
    }

    fn players(system: &ActorSystem, store: Arc<InMemoryStore<Player>>) -> ActorRegistry<Player> {
        let handlers = HandlerTable::new()
            .on("level_up", |ctx: &mut HandlerContext<'_, Player>, _: ()| {
                ctx.state_mut().level += 1;
                Ok(ctx.state().level)
            })
            .unwrap();
        system
            .registry_builder("player")
            .unwrap()
            .store(store)
            .handlers(handlers)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_by_kind_and_type() {
        let system = ActorSystem::new();
        let store = Arc::new(InMemoryStore::new());
        system.register(players(&system, store)).unwrap();

        assert!(system.registry::<Player>("player").is_some());
        assert!(system.registry::<Guild>("player").is_none());
        assert!(system.registry::<Player>("guild").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_kind_rejected() {
        let system = ActorSystem::new();
        let store = Arc::new(InMemoryStore::new());
        system.register(players(&system, Arc::clone(&store))).unwrap();

        let err = system.register(players(&system, store)).unwrap_err();
        assert_eq!(
            err,
            SystemError::DuplicateKind {
                kind: "player".into()
            }
        );
    }

    #[tokio::test]
    async fn test_per_kind_settings_applied() {
        let mut config = RuntimeConfig::default();
        config.kinds.insert(
            "guild".into(),
            runtime_config::RegistrySettings {
                mailbox_capacity: 7,
                ..Default::default()
            },
        );
        let system = ActorSystem::with_config(config);

        let guilds = system
            .registry_builder::<Guild>("guild")
            .unwrap()
            .store(Arc::new(InMemoryStore::new()))
            .build()
            .unwrap();
        assert_eq!(guilds.config().mailbox_capacity, 7);
    }

    #[tokio::test]
    async fn test_shutdown_reaches_every_registry() {
        let system = ActorSystem::new();
        let store = Arc::new(InMemoryStore::new());
        store.insert(1, Player::default());
        system.register(players(&system, Arc::clone(&store))).unwrap();

        let guild_store = Arc::new(InMemoryStore::new());
        guild_store.insert(
            5,
            Guild {
                name: "Night Watch".into(),
            },
        );
        let guilds = system
            .registry_builder::<Guild>("guild")
            .unwrap()
            .store(guild_store)
            .build()
            .unwrap();
        system.register(guilds).unwrap();

        let players = system.registry::<Player>("player").unwrap();
        let level: u32 = players.ask(1, "level_up", (), Duration::from_secs(1)).await.unwrap();
        assert_eq!(level, 1);
        system.registry::<Guild>("guild").unwrap().get_or_create(5).await.unwrap();
        assert_eq!(system.resident(), 2);

        let reports = system.shutdown().await;
        assert_eq!(reports["player"].persisted, 1);
        assert_eq!(reports["guild"].deactivated, 1);
        assert_eq!(system.resident(), 0);
        assert_eq!(store.get(1).unwrap().level, 1);
    }
}
