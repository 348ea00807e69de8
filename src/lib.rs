pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::app::dashboard::{DashboardAssembler, DashboardState};
pub use crate::config::SyncConfig;
pub use crate::core::aggregate::{run_all, AggregateRequest, AggregateResult};
pub use crate::core::deadline::{run_with_deadline, Deadline};
pub use crate::core::fallback::{run_safe, run_safe_optional};
pub use crate::core::reconcile::{Reconciler, ReconciliationOutcome};
pub use crate::core::retry::RetryPolicy;
pub use crate::utils::error::{Result, SyncError};
