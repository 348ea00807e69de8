pub mod dashboard;

pub use dashboard::{DashboardAssembler, DashboardSettings, DashboardState, DashboardStats, DashboardView};
