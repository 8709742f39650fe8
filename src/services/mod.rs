pub mod health_monitor;
pub mod scheduler;

pub use health_monitor::{Freshness, HealthMonitor, HealthReport, PipelineStatus, RunPerformance};
pub use scheduler::{run_scheduler, DEFAULT_POLL_INTERVAL};
