// ABOUTME: Monitor module - live introspection and operator tooling.
// ABOUTME: Contains the polling monitor, markdown dashboard, and stress harness.

mod dashboard;
mod monitor;
mod stress;

pub use dashboard::{render_markdown, spawn_dashboard_writer};
pub use monitor::{LockView, Monitor, MonitorSnapshot, spawn_sweeper};
pub use stress::{StressConfig, StressReport, run_stress};

#[cfg(test)]
mod monitor_test;
