//! # Entity Runtime Configuration
//!
//! Settings for actor registries and the cluster ring, loaded from TOML with
//! environment-variable overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! let config = runtime_config::load_config(None, Some("production"))?;
//! let players = config.settings_for("player");
//! println!("player mailbox capacity: {}", players.mailbox_capacity);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod defaults;
pub mod runtime_config;

pub use runtime_config::{
    load_config, BackpressureSetting, ClusterSettings, NodeSettings, RegistrySettings,
    RuntimeConfig,
};
