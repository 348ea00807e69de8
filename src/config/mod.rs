#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::ProbeArgs;
pub use toml_config::{
    DashboardConfig, DeadlineConfig, ReconcileConfig, RetryConfig, StoreConfig, SyncConfig,
};
