//! Runtime defaults
//!
//! Values used when a setting is absent from every configuration source.

/// Actor registry defaults
pub mod registry {
    /// Soft mailbox capacity per actor
    pub const MAILBOX_CAPACITY: usize = 1_000;

    /// BlockWithTimeout wait bound (milliseconds)
    pub const BLOCK_TIMEOUT_MS: u64 = 3_000;

    /// Messages processed per scheduled drain turn
    pub const BATCH_SIZE: usize = 100;

    /// Minimum time between saves of a dirty actor (milliseconds)
    pub const PERSIST_INTERVAL_MS: u64 = 30_000;

    /// Idle time before an actor is evicted (milliseconds)
    pub const IDLE_TIMEOUT_MS: u64 = 600_000;

    /// Persistence / eviction sweep cadence (milliseconds)
    pub const MAINTENANCE_INTERVAL_MS: u64 = 5_000;

    /// Bound on waiting for in-flight drain turns at shutdown (milliseconds)
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 10_000;
}

/// Cluster ring defaults
pub mod cluster {
    /// Virtual points per physical node
    pub const VIRTUAL_NODES: usize = 160;

    /// Node id used when none is configured
    pub const LOCAL_NODE_ID: &str = "local";
}

/// Prefix for environment variable overrides, e.g. `ENTITY_REGISTRY__BATCH_SIZE`
pub const ENV_PREFIX: &str = "ENTITY";
